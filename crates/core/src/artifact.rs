//! Derived artifact identifiers and values.
//!
//! An artifact id names one file inside an entity container: `total` for the
//! total count, `version-{label}` for a per-version count. Labels are
//! percent-encoded so that any label maps to a single file name and can be
//! recovered from it; unreserved characters stay verbatim, which keeps the
//! common `version-1.0` style names unchanged.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::result::Result;
use crate::types::SnapshotDate;

const TOTAL_ID: &str = "total";
const VERSION_PREFIX: &str = "version-";

/// What a derived artifact measures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Total,
    Version(String),
}

/// Stable, reversible identifier of a derived artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId {
    // Canonical encoded form; ordering and equality follow it.
    encoded: String,
}

impl ArtifactId {
    pub fn total() -> Self {
        Self {
            encoded: TOTAL_ID.to_string(),
        }
    }

    pub fn version(label: &str) -> Self {
        Self {
            encoded: format!("{VERSION_PREFIX}{}", urlencoding::encode(label)),
        }
    }

    pub fn from_kind(kind: &ArtifactKind) -> Self {
        match kind {
            ArtifactKind::Total => Self::total(),
            ArtifactKind::Version(label) => Self::version(label),
        }
    }

    /// Parse an encoded id back into an artifact id.
    ///
    /// Only canonical encodings are accepted, so every id has exactly one
    /// spelling.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArtifactId` if `input` is neither `total` nor a
    /// canonically encoded `version-*` id.
    pub fn parse(input: &str) -> Result<Self> {
        if input == TOTAL_ID {
            return Ok(Self::total());
        }
        let encoded_label = input
            .strip_prefix(VERSION_PREFIX)
            .ok_or_else(|| Error::invalid_artifact_id(input))?;
        let label = urlencoding::decode(encoded_label)
            .map_err(|_| Error::invalid_artifact_id(input))?;
        let id = Self::version(&label);
        if id.encoded == input {
            Ok(id)
        } else {
            Err(Error::invalid_artifact_id(input))
        }
    }

    /// Parse a file name of the form `{id}.json`.
    ///
    /// A `version-*` stem that is not canonically encoded, such as a label
    /// written verbatim by older tooling, still yields an id that keeps the
    /// stem as-is. [`ArtifactId::version`] never produces such an id, so it is
    /// only ever planned for removal.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".json")?;
        match Self::parse(stem) {
            Ok(id) => Some(id),
            Err(_) if stem.starts_with(VERSION_PREFIX) => {
                Some(Self {
                    encoded: stem.to_string(),
                })
            }
            Err(_) => None,
        }
    }

    /// Whether this id is the canonical spelling of its kind.
    pub fn is_canonical(&self) -> bool {
        Self::parse(&self.encoded).is_ok()
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.encoded)
    }

    pub fn kind(&self) -> ArtifactKind {
        match self.encoded.strip_prefix(VERSION_PREFIX) {
            Some(label) => ArtifactKind::Version(
                urlencoding::decode(label)
                    .map(|cow| cow.into_owned())
                    .unwrap_or_else(|_| label.to_string()),
            ),
            None => ArtifactKind::Total,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl Serialize for ArtifactId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded)
    }
}

impl<'de> Deserialize<'de> for ArtifactId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Date-ordered values of one metric.
pub type Series = BTreeMap<SnapshotDate, u64>;

/// The value a derived artifact holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactValue {
    /// Single count, rendered as a badge.
    Count(u64),
    /// Whole history of a metric, rendered as a date map.
    Series(Series),
}

impl From<u64> for ArtifactValue {
    fn from(value: u64) -> Self {
        Self::Count(value)
    }
}

impl From<Series> for ArtifactValue {
    fn from(value: Series) -> Self {
        Self::Series(value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_labels_keep_legacy_names() {
        assert_eq!(ArtifactId::total().file_name(), "total.json");
        assert_eq!(ArtifactId::version("1.0").as_str(), "version-1.0");
        assert_eq!(
            ArtifactId::version("2024.1.0-beta_2").as_str(),
            "version-2024.1.0-beta_2"
        );
    }

    #[test]
    fn test_unsafe_labels_are_encoded_without_collisions() {
        let slash = ArtifactId::version("feature/x");
        let underscore = ArtifactId::version("feature_x");
        assert_eq!(slash.as_str(), "version-feature%2Fx");
        assert_ne!(slash, underscore);
        assert!(!slash.file_name().contains('/'));
        assert_eq!(
            slash.kind(),
            ArtifactKind::Version("feature/x".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_non_artifacts() {
        assert!(ArtifactId::parse("badge").is_err());
        assert!(ArtifactId::parse("Total").is_err());
        // Non-canonical spelling of "version-1.0".
        assert!(ArtifactId::parse("version-1%2E0").is_err());
        assert!(ArtifactId::from_file_name("total.txt").is_none());
        assert!(ArtifactId::from_file_name("notes.json").is_none());
        assert_eq!(
            ArtifactId::from_file_name("version-1.0.json"),
            Some(ArtifactId::version("1.0"))
        );
    }

    #[test]
    fn test_verbatim_legacy_file_names_are_recognized() {
        for name in ["version-1.0+hacs.json", "version-0.9 beta.json", "version-1%2E0.json"] {
            let id = ArtifactId::from_file_name(name).unwrap();
            assert!(!id.is_canonical(), "{name}");
            assert_eq!(id.file_name(), name);
        }
        assert_ne!(
            ArtifactId::from_file_name("version-1.0+hacs.json"),
            Some(ArtifactId::version("1.0+hacs"))
        );
        assert!(ArtifactId::version("1.0+hacs").is_canonical());
        assert!(ArtifactId::total().is_canonical());
    }

    #[test]
    fn test_ids_sort_lexicographically() {
        let mut ids = vec![
            ArtifactId::version("2.0"),
            ArtifactId::total(),
            ArtifactId::version("1.0"),
        ];
        ids.sort();
        let names: Vec<_> = ids.iter().map(ArtifactId::as_str).collect();
        assert_eq!(names, vec!["total", "version-1.0", "version-2.0"]);
    }

    proptest! {
        #[test]
        fn prop_version_ids_round_trip(label in ".*") {
            let id = ArtifactId::version(&label);
            prop_assert_eq!(ArtifactId::parse(id.as_str()).unwrap(), id.clone());
            prop_assert_eq!(id.kind(), ArtifactKind::Version(label));
            prop_assert!(!id.as_str().contains('/'));
            prop_assert!(!id.as_str().contains('\\'));
        }

        #[test]
        fn prop_distinct_labels_get_distinct_ids(a in ".{0,8}", b in ".{0,8}") {
            prop_assume!(a != b);
            prop_assert_ne!(ArtifactId::version(&a), ArtifactId::version(&b));
        }
    }
}
