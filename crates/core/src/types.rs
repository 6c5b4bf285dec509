//! Snapshot domain types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::result::Result;

/// Identifier of one tracked integration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Calendar day a snapshot was captured on. Renders as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotDate(NaiveDate);

impl SnapshotDate {
    const FORMAT: &'static str = "%Y-%m-%d";

    /// Build a date from its components.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDate` if the components do not name a calendar day.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| Error::invalid_date(format!("{year}-{month}-{day}"), "no such day"))
    }

    /// Parse a strict `YYYY-MM-DD` string.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDate` for anything that is not a valid calendar day
    /// in that exact layout.
    pub fn parse(input: &str) -> Result<Self> {
        // chrono accepts unpadded fields; the stored layout is always zero-padded.
        if input.len() != 10 {
            return Err(Error::invalid_date(input, "expected YYYY-MM-DD"));
        }
        NaiveDate::parse_from_str(input, Self::FORMAT)
            .map(Self)
            .map_err(|e| Error::invalid_date(input, e.to_string()))
    }

    pub const fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Today's date on the local clock.
    pub fn today() -> Self {
        Self(chrono::Local::now().date_naive())
    }

    pub const fn as_naive(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for SnapshotDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl FromStr for SnapshotDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for SnapshotDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SnapshotDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Installation counts for one integration in one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub versions: BTreeMap<String, u64>,
}

impl EntityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    #[must_use]
    pub fn with_version(mut self, label: impl Into<String>, count: u64) -> Self {
        self.versions.insert(label.into(), count);
        self
    }
}

/// One capture of the full dataset, keyed by integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entities: BTreeMap<EntityId, EntityMetrics>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a snapshot captured on `date`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedSnapshot` if the bytes are not a JSON object of
    /// entity metrics with non-negative integer counts.
    pub fn from_json(date: SnapshotDate, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::malformed_snapshot(date, e.to_string()))
    }

    /// Encode as compact JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedSnapshot` if serialization fails.
    pub fn to_json(&self, date: SnapshotDate) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::malformed_snapshot(date, e.to_string()))
    }

    #[must_use]
    pub fn with_entity(mut self, id: impl Into<EntityId>, metrics: EntityMetrics) -> Self {
        self.insert(id.into(), metrics);
        self
    }

    pub fn insert(&mut self, id: EntityId, metrics: EntityMetrics) {
        self.entities.insert(id, metrics);
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityMetrics> {
        self.entities.get(id)
    }

    /// Entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntityMetrics)> {
        self.entities.iter()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl FromIterator<(EntityId, EntityMetrics)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (EntityId, EntityMetrics)>>(iter: T) -> Self {
        Self {
            entities: iter.into_iter().collect(),
        }
    }
}
