// src/content/pattern.rs

//! Content units and NEVRA package patterns

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The unit key of a content unit: an open mapping identifying one unit
/// (package fields, a group name, an advisory id).
pub type UnitKey = serde_json::Map<String, serde_json::Value>;

/// One remotely specified content unit: a content type and the key
/// identifying the unit within that type. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentUnit {
    pub type_id: String,
    pub unit_key: UnitKey,
}

/// Options recognized by content handlers. Unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentOptions {
    /// Commit the transaction. False means dry run.
    #[serde(default = "default_apply")]
    pub apply: bool,
    /// Update-all flag (package handler only): with no patterns given,
    /// perform a full-system update.
    #[serde(default)]
    pub all: bool,
}

fn default_apply() -> bool {
    true
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            apply: true,
            all: false,
        }
    }
}

/// Package matching pattern (NEVRA).
///
/// Only the name is required. The canonical string form concatenates the
/// present fields as `epoch:name-version-release.arch`, omitting the
/// separator along with any empty field. Values with embedded separator
/// characters are unsupported; there is no escaping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Pattern {
    pub name: String,
    #[serde(default)]
    pub epoch: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub arch: String,
}

impl Pattern {
    /// Pattern matching the name alone.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Build a pattern from a content unit key.
    pub fn from_unit_key(key: &UnitKey) -> Result<Self> {
        let pattern: Pattern =
            serde_json::from_value(serde_json::Value::Object(key.clone()))?;
        if pattern.name.is_empty() {
            return Err(Error::ParseError(format!(
                "Package unit key has no name: {}",
                serde_json::Value::Object(key.clone())
            )));
        }
        Ok(pattern)
    }

    /// Canonical NEVRA string form, used verbatim as the package manager
    /// matching pattern.
    pub fn nevra(&self) -> String {
        // (prefix, value, suffix) in fixed field order; empty fields are
        // skipped together with their separators.
        let fields = [
            ("", self.epoch.as_str(), ":"),
            ("", self.name.as_str(), ""),
            ("-", self.version.as_str(), ""),
            ("-", self.release.as_str(), ""),
            (".", self.arch.as_str(), ""),
        ];
        let mut pattern = String::new();
        for (prefix, value, suffix) in fields {
            if value.is_empty() {
                continue;
            }
            pattern.push_str(prefix);
            pattern.push_str(value);
            pattern.push_str(suffix);
        }
        pattern
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nevra())
    }
}
