//! On-disk encodings of artifact values.
//!
//! Badge files follow the shields.io endpoint schema. Series files put one
//! `"date": count` pair per line, sorted by date, so that each daily run
//! shows up as a one-line diff.

use std::fmt::Write as _;

use badgesync_core::{ArtifactValue, Series};
use serde::{Deserialize, Serialize};

use crate::error::FormatError;

const BADGE_SCHEMA_VERSION: u8 = 1;
const BADGE_LABEL: &str = "Installations";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Badge {
    schema_version: u8,
    label: String,
    message: String,
}

/// File layout used by an artifact store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Single counts as endpoint badges.
    Badge,
    /// Date-ordered series in the line-per-date layout.
    Series,
}

impl ArtifactFormat {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Badge => "badge",
            Self::Series => "series",
        }
    }

    /// Render `value` as file contents.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::Mismatch` if the value kind does not belong in
    /// this format, or `FormatError::Encode` if serialization fails.
    pub fn encode(self, value: &ArtifactValue) -> Result<Vec<u8>, FormatError> {
        match (self, value) {
            (Self::Badge, ArtifactValue::Count(count)) => encode_badge(*count),
            (Self::Series, ArtifactValue::Series(series)) => Ok(encode_series(series).into_bytes()),
            (Self::Badge, ArtifactValue::Series(_)) => Err(self.mismatch("series")),
            (Self::Series, ArtifactValue::Count(_)) => Err(self.mismatch("count")),
        }
    }

    /// Read file contents back into a value.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::Decode` if the bytes are not a valid file of this
    /// format.
    pub fn decode(self, bytes: &[u8]) -> Result<ArtifactValue, FormatError> {
        match self {
            Self::Badge => {
                let badge: Badge = serde_json::from_slice(bytes)
                    .map_err(|e| FormatError::decode(e.to_string()))?;
                badge
                    .message
                    .trim()
                    .parse()
                    .map(ArtifactValue::Count)
                    .map_err(|e| FormatError::decode(format!("badge message: {e}")))
            }
            Self::Series => serde_json::from_slice::<Series>(bytes)
                .map(ArtifactValue::Series)
                .map_err(|e| FormatError::decode(e.to_string())),
        }
    }

    const fn mismatch(self, value: &'static str) -> FormatError {
        FormatError::Mismatch {
            format: self.name(),
            value,
        }
    }
}

fn encode_badge(count: u64) -> Result<Vec<u8>, FormatError> {
    let badge = Badge {
        schema_version: BADGE_SCHEMA_VERSION,
        label: BADGE_LABEL.to_string(),
        message: count.to_string(),
    };
    serde_json::to_vec(&badge).map_err(|e| FormatError::encode(e.to_string()))
}

fn encode_series(series: &Series) -> String {
    let mut out = String::from("{\n");
    let last = series.len().saturating_sub(1);
    for (i, (date, count)) in series.iter().enumerate() {
        let comma = if i < last { "," } else { "" };
        // Writing to a String cannot fail.
        let _ = writeln!(out, "\"{date}\": {count}{comma}");
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use badgesync_core::SnapshotDate;

    fn series(points: &[(&str, u64)]) -> Series {
        points
            .iter()
            .map(|(d, v)| (SnapshotDate::parse(d).unwrap(), *v))
            .collect()
    }

    #[test]
    fn test_badge_layout() {
        let bytes = ArtifactFormat::Badge.encode(&ArtifactValue::Count(100)).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"schemaVersion":1,"label":"Installations","message":"100"}"#
        );
    }

    #[test]
    fn test_badge_decodes_legacy_spacing() {
        let legacy = br#"{"schemaVersion": 1, "label": "Installations", "message": "42"}"#;
        assert_eq!(
            ArtifactFormat::Badge.decode(legacy).unwrap(),
            ArtifactValue::Count(42)
        );
    }

    #[test]
    fn test_badge_rejects_non_numeric_message() {
        let bad = br#"{"schemaVersion": 1, "label": "Installations", "message": "many"}"#;
        assert!(ArtifactFormat::Badge.decode(bad).is_err());
    }

    #[test]
    fn test_series_layout_one_line_per_date() {
        let value = ArtifactValue::Series(series(&[("2024-01-02", 15), ("2024-01-01", 10)]));
        let text = String::from_utf8(ArtifactFormat::Series.encode(&value).unwrap()).unwrap();
        assert_eq!(text, "{\n\"2024-01-01\": 10,\n\"2024-01-02\": 15\n}\n");
        assert_eq!(ArtifactFormat::Series.decode(text.as_bytes()).unwrap(), value);
    }

    #[test]
    fn test_empty_series_is_valid_json() {
        let text = ArtifactFormat::Series
            .encode(&ArtifactValue::Series(Series::new()))
            .unwrap();
        assert_eq!(text, b"{\n}\n");
        assert!(ArtifactFormat::Series.decode(&text).is_ok());
    }

    #[test]
    fn test_format_mismatch() {
        let err = ArtifactFormat::Series
            .encode(&ArtifactValue::Count(1))
            .unwrap_err();
        assert!(matches!(err, FormatError::Mismatch { .. }));
    }
}
