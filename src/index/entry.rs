//! Index entry types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Checksum written into fresh entries and skeleton definitions.
pub const ZERO_CRC: &str = "0x00000000";

/// Recorded state of one command sequence.
///
/// Entries nest through `subcommands`, mirroring the sequence path. Keys this
/// crate does not know are carried in `extra` so other writers' fields
/// survive a read-modify-write cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub crc: String,

    #[serde(default)]
    pub updated_timestamp: f64,

    #[serde(default)]
    pub checked_timestamp: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_definition_file: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subcommands: BTreeMap<String, IndexEntry>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl IndexEntry {
    /// Returns true if no capture has been recorded here yet
    pub fn is_placeholder(&self) -> bool {
        self.crc.is_empty()
    }
}

/// Partial update merged into an entry; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryUpdate {
    pub crc: Option<String>,
    pub updated_timestamp: Option<f64>,
    pub checked_timestamp: Option<f64>,
    pub baseline_file: Option<String>,
    pub json_definition_file: Option<String>,
}

impl EntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn crc(mut self, crc: impl Into<String>) -> Self {
        self.crc = Some(crc.into());
        self
    }

    pub fn updated_timestamp(mut self, ts: f64) -> Self {
        self.updated_timestamp = Some(ts);
        self
    }

    pub fn checked_timestamp(mut self, ts: f64) -> Self {
        self.checked_timestamp = Some(ts);
        self
    }

    pub fn baseline_file(mut self, path: impl Into<String>) -> Self {
        self.baseline_file = Some(path.into());
        self
    }

    pub fn json_definition_file(mut self, path: impl Into<String>) -> Self {
        self.json_definition_file = Some(path.into());
        self
    }

    pub(crate) fn apply(&self, entry: &mut IndexEntry) {
        if let Some(crc) = &self.crc {
            entry.crc = crc.clone();
        }
        if let Some(ts) = self.updated_timestamp {
            entry.updated_timestamp = ts;
        }
        if let Some(ts) = self.checked_timestamp {
            entry.checked_timestamp = ts;
        }
        if let Some(path) = &self.baseline_file {
            entry.baseline_file = Some(path.clone());
        }
        if let Some(path) = &self.json_definition_file {
            entry.json_definition_file = Some(path.clone());
        }
    }
}

/// Outcome of recording one successful capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// No previous capture existed
    New,
    /// Checksum differs from the recorded one
    Changed { previous: String },
    /// Checksum matches; only the check time moved
    Unchanged,
}

/// A successful capture ready to be recorded
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub crc: String,
    pub timestamp: f64,
    pub baseline_file: Option<String>,
    pub json_definition_file: Option<String>,
}
