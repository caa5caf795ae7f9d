//! Tool index: the durable JSON registry of captured baselines.
//!
//! The index is one JSON document mapping tool names to [`IndexEntry`] trees.
//! It is written atomically (temp file + rename) with sorted keys, and every
//! read-modify-write cycle across processes goes through [`IndexLock`].
//!
//! Loading is self-healing: entries that are not objects or lack a `crc` key
//! are dropped with a warning instead of failing the load.

mod entry;
mod lock;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::domain::CommandSequence;
use crate::error::{Result, ToolsyncError};

pub use entry::{Change, EntryUpdate, IndexEntry, Verification, ZERO_CRC};
pub use lock::IndexLock;

/// In-memory snapshot of the index file.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolIndex {
    path: PathBuf,
    entries: BTreeMap<String, IndexEntry>,
}

impl ToolIndex {
    /// Empty index that will save to `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the index; a missing file yields an empty index.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("Index {} not found, starting empty", path.display());
            return Ok(Self::new(path));
        }

        let content = fs::read_to_string(path)?;
        let entries = Self::parse(&content)?;
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    fn parse(content: &str) -> Result<BTreeMap<String, IndexEntry>> {
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str::<Value>(content)? {
            Value::Object(map) => Ok(sanitize_entries(map, "")),
            other => Err(ToolsyncError::Index(format!(
                "expected a JSON object at the top level, found {}",
                value_kind(&other)
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &BTreeMap<String, IndexEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `seq`, following nested subcommands. `None` on any missing link.
    pub fn get_entry(&self, seq: &CommandSequence) -> Option<&IndexEntry> {
        let (tool, rest) = seq.parts().split_first()?;
        rest.iter()
            .try_fold(self.entries.get(tool)?, |entry, segment| entry.subcommands.get(segment))
    }

    /// Merge `update` into the entry for `seq`, creating placeholders on the way.
    pub fn update_entry(&mut self, seq: &CommandSequence, update: &EntryUpdate) {
        update.apply(self.entry_mut(seq));
    }

    fn entry_mut(&mut self, seq: &CommandSequence) -> &mut IndexEntry {
        let mut entry = self.entries.entry(seq.tool().to_string()).or_default();
        for segment in seq.subcommands() {
            entry = entry.subcommands.entry(segment.clone()).or_default();
        }
        entry
    }

    /// Record a successful capture.
    ///
    /// `checked_timestamp` always moves to the capture time; `crc` and
    /// `updated_timestamp` only change when the checksum differs.
    pub fn record_verification(&mut self, seq: &CommandSequence, verification: &Verification) -> Change {
        let entry = self.entry_mut(seq);

        let change = if entry.is_placeholder() {
            Change::New
        } else if entry.crc != verification.crc {
            Change::Changed {
                previous: entry.crc.clone(),
            }
        } else {
            Change::Unchanged
        };

        let mut update = EntryUpdate::new().checked_timestamp(verification.timestamp);
        if change != Change::Unchanged {
            update = update
                .crc(verification.crc.clone())
                .updated_timestamp(verification.timestamp);
        }
        if let Some(path) = &verification.baseline_file {
            update = update.baseline_file(path.clone());
        }
        if let Some(path) = &verification.json_definition_file {
            update = update.json_definition_file(path.clone());
        }
        update.apply(entry);
        change
    }

    /// Drop top-level entries whose tool is not in `keep`. Returns removed names.
    pub fn prune(&mut self, keep: &BTreeSet<String>) -> Vec<String> {
        let removed: Vec<String> = self
            .entries
            .keys()
            .filter(|name| !keep.contains(*name))
            .cloned()
            .collect();
        for name in &removed {
            self.entries.remove(name);
        }
        removed
    }

    /// Serialized document: sorted keys, 2-space indent, trailing newline.
    pub fn to_json(&self) -> Result<String> {
        // serde_json::Map is ordered by key, which sorts nested struct fields too
        let value = serde_json::to_value(&self.entries)?;
        let mut out = serde_json::to_string_pretty(&value)?;
        out.push('\n');
        Ok(out)
    }

    /// Atomically write the index to its path.
    pub fn save(&self) -> Result<()> {
        let content = self.to_json()?;
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| ToolsyncError::Io(e.error))?;
        log::debug!("Saved index {} ({} tools)", self.path.display(), self.entries.len());
        Ok(())
    }

    /// Run `f` on a freshly reloaded index while holding the lock, then save.
    ///
    /// If `f` fails, nothing is written.
    pub fn with_locked<T, F>(path: impl AsRef<Path>, lock_timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&mut ToolIndex) -> Result<T>,
    {
        let path = path.as_ref();
        let _lock = IndexLock::acquire(path, lock_timeout)?;
        let mut index = Self::load(path)?;
        let out = f(&mut index)?;
        index.save()?;
        Ok(out)
    }

    /// Locked reload, single update, save.
    pub fn load_update_and_save(
        path: impl AsRef<Path>,
        seq: &CommandSequence,
        update: &EntryUpdate,
        lock_timeout: Duration,
    ) -> Result<()> {
        Self::with_locked(path, lock_timeout, |index| {
            index.update_entry(seq, update);
            Ok(())
        })
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn sanitize_entries(map: Map<String, Value>, parent: &str) -> BTreeMap<String, IndexEntry> {
    let mut entries = BTreeMap::new();
    for (name, value) in map {
        let path = if parent.is_empty() {
            name.clone()
        } else {
            format!("{parent}:{name}")
        };
        if let Some(entry) = sanitize_entry(value, &path) {
            entries.insert(name, entry);
        }
    }
    entries
}

fn sanitize_entry(value: Value, path: &str) -> Option<IndexEntry> {
    let Value::Object(mut object) = value else {
        log::warn!("Dropping index entry '{}': expected an object, found {}", path, value_kind(&value));
        return None;
    };
    if !object.contains_key("crc") {
        log::warn!("Dropping index entry '{}': missing crc", path);
        return None;
    }

    let subcommands = match object.remove("subcommands") {
        Some(Value::Object(children)) => sanitize_entries(children, path),
        Some(other) => {
            log::warn!(
                "Ignoring subcommands of '{}': expected an object, found {}",
                path,
                value_kind(&other)
            );
            BTreeMap::new()
        }
        None => BTreeMap::new(),
    };

    match serde_json::from_value::<IndexEntry>(Value::Object(object)) {
        Ok(mut entry) => {
            entry.subcommands = subcommands;
            Some(entry)
        }
        Err(e) => {
            log::warn!("Dropping index entry '{}': {}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn seq(parts: &[&str]) -> CommandSequence {
        CommandSequence::from_parts(parts).unwrap()
    }

    fn sample_index(path: &Path) -> ToolIndex {
        let mut index = ToolIndex::new(path);
        index.update_entry(
            &seq(&["toolA"]),
            &EntryUpdate::new()
                .crc("0xABCDEF12")
                .updated_timestamp(1_700_000_000.0)
                .checked_timestamp(1_700_000_100.0)
                .baseline_file("toolA/toolA.txt")
                .json_definition_file("toolA/toolA.json"),
        );
        index.update_entry(
            &seq(&["toolA", "sub1"]),
            &EntryUpdate::new()
                .crc("0x11223344")
                .updated_timestamp(1_700_000_000.0)
                .checked_timestamp(1_700_000_100.0),
        );
        index
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let index = ToolIndex::load(temp.path().join("index.json")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_get_entry_nested_and_missing() {
        let temp = TempDir::new().unwrap();
        let index = sample_index(&temp.path().join("index.json"));

        assert_eq!(index.get_entry(&seq(&["toolA"])).unwrap().crc, "0xABCDEF12");
        assert_eq!(index.get_entry(&seq(&["toolA", "sub1"])).unwrap().crc, "0x11223344");
        assert!(index.get_entry(&seq(&["toolA", "nope"])).is_none());
        assert!(index.get_entry(&seq(&["toolA", "sub1", "deeper"])).is_none());
        assert!(index.get_entry(&seq(&["missing", "sub1"])).is_none());
    }

    #[test]
    fn test_update_creates_intermediate_entries() {
        let temp = TempDir::new().unwrap();
        let mut index = ToolIndex::new(temp.path().join("index.json"));
        index.update_entry(&seq(&["uv", "pip", "install"]), &EntryUpdate::new().crc("0x00000001"));

        let uv = index.get_entry(&seq(&["uv"])).unwrap();
        assert!(uv.is_placeholder());
        assert!(index.get_entry(&seq(&["uv", "pip"])).unwrap().is_placeholder());
        assert_eq!(index.get_entry(&seq(&["uv", "pip", "install"])).unwrap().crc, "0x00000001");
    }

    #[test]
    fn test_update_keeps_sibling_fields() {
        let temp = TempDir::new().unwrap();
        let mut index = sample_index(&temp.path().join("index.json"));
        index.update_entry(&seq(&["toolA"]), &EntryUpdate::new().checked_timestamp(1_800_000_000.0));

        let entry = index.get_entry(&seq(&["toolA"])).unwrap();
        assert_eq!(entry.crc, "0xABCDEF12");
        assert_eq!(entry.updated_timestamp, 1_700_000_000.0);
        assert_eq!(entry.checked_timestamp, 1_800_000_000.0);
        assert_eq!(entry.baseline_file.as_deref(), Some("toolA/toolA.txt"));
        assert!(entry.subcommands.contains_key("sub1"));
    }

    #[test]
    fn test_document_format() {
        let temp = TempDir::new().unwrap();
        let index = sample_index(&temp.path().join("index.json"));
        let json = index.to_json().unwrap();

        assert!(json.ends_with("}\n"));
        assert!(json.starts_with("{\n  \"toolA\": {\n    \"baseline_file\""));
        // Keys are sorted, including struct fields
        let baseline = json.find("\"baseline_file\"").unwrap();
        let checked = json.find("\"checked_timestamp\"").unwrap();
        let crc = json.find("\"crc\"").unwrap();
        let updated = json.rfind("\"updated_timestamp\"").unwrap();
        assert!(baseline < checked && checked < crc && crc < updated);
        assert!(json.contains("1700000000.0"));
    }

    #[test]
    fn test_save_load_roundtrip_is_stable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("deep/dir/index.json");
        let index = sample_index(&path);
        index.save().unwrap();
        let first = fs::read_to_string(&path).unwrap();

        let reloaded = ToolIndex::load(&path).unwrap();
        assert_eq!(reloaded, index);
        reloaded.save().unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_entries_dropped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        let doc = json!({
            "good": {
                "crc": "0x00000001",
                "subcommands": {
                    "ok": {"crc": "0x00000002"},
                    "no_crc": {"updated_timestamp": 1.0},
                    "scalar": 7
                }
            },
            "no_crc": {"updated_timestamp": 1.0},
            "not_object": "string",
            "bad_crc_type": {"crc": 12}
        });
        fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let index = ToolIndex::load(&path).unwrap();
        assert_eq!(index.entries().keys().collect::<Vec<_>>(), vec!["good"]);
        let good = index.get_entry(&seq(&["good"])).unwrap();
        assert_eq!(good.subcommands.keys().collect::<Vec<_>>(), vec!["ok"]);
    }

    #[test]
    fn test_non_object_document_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(ToolIndex::load(&path), Err(ToolsyncError::Index(_))));
    }

    #[test]
    fn test_record_verification_timestamps() {
        let temp = TempDir::new().unwrap();
        let mut index = ToolIndex::new(temp.path().join("index.json"));
        let tool = seq(&["ruff"]);

        let first = Verification {
            crc: "0x0000000A".to_string(),
            timestamp: 100.0,
            baseline_file: Some("ruff/ruff.txt".to_string()),
            json_definition_file: Some("ruff/ruff.json".to_string()),
        };
        assert_eq!(index.record_verification(&tool, &first), Change::New);

        let same = Verification {
            timestamp: 200.0,
            ..first.clone()
        };
        assert_eq!(index.record_verification(&tool, &same), Change::Unchanged);
        let entry = index.get_entry(&tool).unwrap();
        assert_eq!(entry.updated_timestamp, 100.0);
        assert_eq!(entry.checked_timestamp, 200.0);

        let changed = Verification {
            crc: "0x0000000B".to_string(),
            timestamp: 300.0,
            ..first
        };
        assert_eq!(
            index.record_verification(&tool, &changed),
            Change::Changed {
                previous: "0x0000000A".to_string()
            }
        );
        let entry = index.get_entry(&tool).unwrap();
        assert_eq!(entry.crc, "0x0000000B");
        assert_eq!(entry.updated_timestamp, 300.0);
        assert_eq!(entry.checked_timestamp, 300.0);
    }

    #[test]
    fn test_prune() {
        let temp = TempDir::new().unwrap();
        let mut index = sample_index(&temp.path().join("index.json"));
        index.update_entry(&seq(&["gone"]), &EntryUpdate::new().crc("0x00000001"));

        let keep: BTreeSet<String> = ["toolA".to_string()].into();
        assert_eq!(index.prune(&keep), vec!["gone"]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_load_update_and_save() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        sample_index(&path).save().unwrap();

        ToolIndex::load_update_and_save(
            &path,
            &seq(&["toolB"]),
            &EntryUpdate::new().crc("0x000000BB"),
            Duration::from_secs(1),
        )
        .unwrap();

        let index = ToolIndex::load(&path).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get_entry(&seq(&["toolB"])).unwrap().crc, "0x000000BB");
    }

    #[test]
    fn test_lock_timeout_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        sample_index(&path).save().unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let _held = IndexLock::acquire(&path, Duration::from_secs(1)).unwrap();
        let result = ToolIndex::load_update_and_save(
            &path,
            &seq(&["toolB"]),
            &EntryUpdate::new().crc("0x000000BB"),
            Duration::from_millis(50),
        );
        assert!(matches!(result, Err(ToolsyncError::LockTimeout { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_failed_closure_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");

        let result: Result<()> = ToolIndex::with_locked(&path, Duration::from_secs(1), |index| {
            index.update_entry(&seq(&["x"]), &EntryUpdate::new().crc("0x1"));
            Err(ToolsyncError::Index("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
