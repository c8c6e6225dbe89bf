// src/version/mod.rs

//! RPM version (EVR) parsing and comparison
//!
//! Used to decide advisory applicability: a package qualifies for an
//! advisory-driven update only when its installed version is strictly
//! older than the advisory's target version.

use crate::error::{Error, Result};
use semver::Version;
use std::cmp::Ordering;
use std::fmt;

/// A parsed RPM version with epoch, version, and release components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RpmVersion {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl RpmVersion {
    /// Parse an RPM version string
    ///
    /// Format: [epoch:]version[-release]
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "1:2.3.4-5.el8" → epoch=1, version="2.3.4", release=Some("5.el8")
    pub fn parse(s: &str) -> Result<Self> {
        let (epoch_str, rest) = match s.find(':') {
            Some(pos) => (&s[..pos], &s[pos + 1..]),
            None => ("0", s),
        };

        let epoch = if epoch_str.is_empty() {
            // Empty epoch (e.g. ":1.0.0") defaults to 0
            0
        } else {
            epoch_str
                .parse::<u64>()
                .map_err(|e| Error::ParseError(format!("Invalid epoch in version '{}': {}", s, e)))?
        };

        let (version, release) = match rest.find('-') {
            Some(pos) => (rest[..pos].to_string(), Some(rest[pos + 1..].to_string())),
            None => (rest.to_string(), None),
        };

        if version.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty version component in '{}'",
                s
            )));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Normalize to a semver::Version for comparison
    ///
    /// RPM versions may not be semver-compliant; extract major.minor.patch
    /// from the leading dotted numbers when direct parsing fails.
    fn to_semver(&self) -> Option<Version> {
        if let Ok(v) = Version::parse(&self.version) {
            return Some(v);
        }
        let parts: Vec<&str> = self.version.split('.').collect();
        let major = parts.first().and_then(|s| s.parse::<u64>().ok())?;
        let minor = parts.get(1).and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
        let patch = parts.get(2).and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
        Some(Version::new(major, minor, patch))
    }

    /// Compare two RPM versions: epoch, then version, then release.
    pub fn compare(&self, other: &RpmVersion) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (self.to_semver(), other.to_semver()) {
            (Some(v1), Some(v2)) => match v1.cmp(&v2) {
                Ordering::Equal => {}
                ord => return ord,
            },
            _ => {
                // Non-semver versions get the segment-wise treatment
                match segment_cmp(&self.version, &other.version) {
                    Ordering::Equal => {}
                    ord => return ord,
                }
            }
        }

        match (self.release.as_deref(), other.release.as_deref()) {
            (Some(a), Some(b)) => segment_cmp(a, b),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        }
    }
}

/// Segment-wise comparison with rpmvercmp semantics: the strings split
/// into alternating numeric and alphabetic segments at every separator,
/// numeric segments compare as numbers (so "10.el9" sorts after "9.el9"),
/// and a numeric segment sorts newer than an alphabetic one. A string
/// with segments left over sorts newer.
fn segment_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();
    loop {
        a = skip_separators(a);
        b = skip_separators(b);
        if a.is_empty() || b.is_empty() {
            return a.len().cmp(&b.len());
        }

        let a_numeric = a[0].is_ascii_digit();
        let b_numeric = b[0].is_ascii_digit();
        if a_numeric != b_numeric {
            return if a_numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let (seg_a, rest_a) = split_segment(a, a_numeric);
        let (seg_b, rest_b) = split_segment(b, b_numeric);
        let ord = if a_numeric {
            let seg_a = strip_leading_zeros(seg_a);
            let seg_b = strip_leading_zeros(seg_b);
            // More digits means a bigger number; equal lengths compare
            // digit by digit.
            seg_a.len().cmp(&seg_b.len()).then_with(|| seg_a.cmp(seg_b))
        } else {
            seg_a.cmp(seg_b)
        };
        if ord != Ordering::Equal {
            return ord;
        }
        a = rest_a;
        b = rest_b;
    }
}

fn skip_separators(s: &[u8]) -> &[u8] {
    let start = s
        .iter()
        .position(|c| c.is_ascii_alphanumeric())
        .unwrap_or(s.len());
    &s[start..]
}

fn split_segment(s: &[u8], numeric: bool) -> (&[u8], &[u8]) {
    let end = s
        .iter()
        .position(|c| {
            if numeric {
                !c.is_ascii_digit()
            } else {
                !c.is_ascii_alphabetic()
            }
        })
        .unwrap_or(s.len());
    s.split_at(end)
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|c| *c != b'0').unwrap_or(s.len());
    &s[start..]
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let v = RpmVersion::parse("1.2.3").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.version, "1.2.3");
        assert_eq!(v.release, None);
    }

    #[test]
    fn test_parse_full() {
        let v = RpmVersion::parse("1:2.3.4-5.el8").unwrap();
        assert_eq!(v.epoch, 1);
        assert_eq!(v.version, "2.3.4");
        assert_eq!(v.release, Some("5.el8".to_string()));
    }

    #[test]
    fn test_parse_empty_epoch() {
        // rpm prints "(none)" epochs normalized upstream to ":version"
        let v = RpmVersion::parse(":1.02.208-2.el9").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.version, "1.02.208");
    }

    #[test]
    fn test_compare_epoch_wins() {
        let v1 = RpmVersion::parse("1:1.0.0").unwrap();
        let v2 = RpmVersion::parse("0:2.0.0").unwrap();
        assert!(v1 > v2);
    }

    #[test]
    fn test_compare_versions_and_releases() {
        assert!(RpmVersion::parse("1.2.3").unwrap() < RpmVersion::parse("1.2.4").unwrap());
        assert!(RpmVersion::parse("1.2.3-1").unwrap() < RpmVersion::parse("1.2.3-2").unwrap());
    }

    #[test]
    fn test_release_compare_is_numeric_not_lexical() {
        // "10" sorts after "9" even though it sorts before it as a string.
        assert!(
            RpmVersion::parse("0:2.4.57-9.el9").unwrap()
                < RpmVersion::parse("0:2.4.57-10.el9").unwrap()
        );
        assert!(RpmVersion::parse("1.0-2").unwrap() < RpmVersion::parse("1.0-10").unwrap());
        assert!(RpmVersion::parse("1.0-10").unwrap() > RpmVersion::parse("1.0-9").unwrap());
    }

    #[test]
    fn test_release_segment_semantics() {
        // Numeric segments sort newer than alphabetic ones.
        assert!(RpmVersion::parse("1.0-1.beta").unwrap() < RpmVersion::parse("1.0-1.1").unwrap());
        // Leading zeros do not change the number.
        assert_eq!(
            RpmVersion::parse("1.0-02.el9")
                .unwrap()
                .compare(&RpmVersion::parse("1.0-2.el9").unwrap()),
            Ordering::Equal
        );
        // A release with segments left over sorts newer.
        assert!(RpmVersion::parse("1.0-2").unwrap() < RpmVersion::parse("1.0-2.el9").unwrap());
    }

    #[test]
    fn test_strictly_older_for_advisory_applicability() {
        let installed = RpmVersion::parse("0:2.4.57-4.el9").unwrap();
        let target = RpmVersion::parse("0:2.4.57-5.el9").unwrap();
        assert!(installed < target);
        assert!(!(target < target));
    }

    #[test]
    fn test_display_round_trip() {
        let v = RpmVersion::parse("2:1.2.3-4.el8").unwrap();
        assert_eq!(v.to_string(), "2:1.2.3-4.el8");
        assert_eq!(RpmVersion::parse("1.2.3").unwrap().to_string(), "1.2.3");
    }
}
