// src/advisory.rs

//! Advisory (erratum) matching
//!
//! Advisories are matched by a case-insensitive id set and/or by type
//! category. When updating via advisories, a package qualifies only if the
//! installed version is strictly older than the advisory's target version.

use std::collections::HashSet;

/// Advisory type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvisoryKind {
    Bugfix,
    Enhancement,
    Security,
    Unknown,
}

impl AdvisoryKind {
    /// Parse a category label as printed by `dnf updateinfo list` /
    /// `yum updateinfo list` (e.g. "security", "Moderate/Sec.", "bugfix").
    pub fn parse(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.contains("sec") {
            Self::Security
        } else if label.contains("bug") {
            Self::Bugfix
        } else if label.contains("enh") {
            Self::Enhancement
        } else {
            Self::Unknown
        }
    }
}

/// Filter by advisory ids and/or kinds. An empty criterion matches
/// everything.
#[derive(Debug, Clone, Default)]
pub struct AdvisoryFilter {
    ids: HashSet<String>,
    kinds: HashSet<AdvisoryKind>,
}

impl AdvisoryFilter {
    /// Filter by advisory ids (matched case-insensitively).
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ids: ids
                .into_iter()
                .map(|s| s.as_ref().to_ascii_uppercase())
                .collect(),
            kinds: HashSet::new(),
        }
    }

    /// Filter by advisory kinds.
    pub fn by_kinds<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = AdvisoryKind>,
    {
        Self {
            ids: HashSet::new(),
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.kinds.is_empty()
    }

    /// True when the advisory passes every non-empty criterion.
    pub fn matches(&self, id: &str, kind: AdvisoryKind) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&id.to_ascii_uppercase()) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&kind) {
            return false;
        }
        true
    }
}
