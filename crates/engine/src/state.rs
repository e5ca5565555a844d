//! Persistent state between runs
//!
//! Performance samples and priority adjustments are stored in a redb database
//! so the scores learned in one CLI invocation carry over to the next.

use crate::history::{HistoryExport, PerformanceSample};
use hookflow_core::{Error, Result};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;

/// Bucket holding performance samples, keyed by hook name
pub const HISTORY_BUCKET: &str = "performanceHistory";

/// Bucket holding priority adjustments, keyed by hook name
pub const ADJUSTMENT_BUCKET: &str = "priorityAdjustments";

/// Key-value storage organized in buckets
pub trait PersistentState: Send + Sync {
    /// Get a value from a bucket
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Set a value in a bucket
    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key from a bucket
    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()>;

    /// Delete an entire bucket
    fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// Swap the contents of a bucket for `entries` in one transaction
    fn replace_bucket(&self, bucket: &str, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<()>;

    /// Iterate over all key-value pairs in a bucket
    fn for_each<F>(&self, bucket: &str, f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>;
}

/// Persistent state implementation using redb
pub struct RedbPersistentState {
    db: Database,
}

impl std::fmt::Debug for RedbPersistentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbPersistentState").finish_non_exhaustive()
    }
}

impl RedbPersistentState {
    /// Create or open a persistent state database
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)
            .map_err(|e| Error::State(format!("Failed to create database: {e}")))?;
        Ok(Self { db })
    }

    fn table_def(bucket: &str) -> Result<TableDefinition<'static, &'static [u8], &'static [u8]>> {
        match bucket {
            HISTORY_BUCKET => Ok(TableDefinition::new(HISTORY_BUCKET)),
            ADJUSTMENT_BUCKET => Ok(TableDefinition::new(ADJUSTMENT_BUCKET)),
            other => Err(Error::State(format!("Unknown state bucket '{other}'"))),
        }
    }
}

impl PersistentState for RedbPersistentState {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table_def = Self::table_def(bucket)?;
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::State(format!("Failed to begin read transaction: {e}")))?;

        let Ok(table) = read_txn.open_table(table_def) else {
            // Table doesn't exist yet
            return Ok(None);
        };

        match table.get(key) {
            Ok(Some(value)) => Ok(Some(value.value().to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::State(format!("Failed to get value: {e}"))),
        }
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let table_def = Self::table_def(bucket)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(|e| Error::State(format!("Failed to open table: {e}")))?;
            table
                .insert(key, value)
                .map_err(|e| Error::State(format!("Failed to insert value: {e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))?;
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        let table_def = Self::table_def(bucket)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(|e| Error::State(format!("Failed to open table: {e}")))?;
            table
                .remove(key)
                .map_err(|e| Error::State(format!("Failed to remove value: {e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))?;
        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let table_def = Self::table_def(bucket)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        write_txn
            .delete_table(table_def)
            .map_err(|e| Error::State(format!("Failed to delete table: {e}")))?;
        write_txn
            .commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))?;
        Ok(())
    }

    fn replace_bucket(&self, bucket: &str, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        let table_def = Self::table_def(bucket)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        write_txn
            .delete_table(table_def)
            .map_err(|e| Error::State(format!("Failed to delete table: {e}")))?;
        {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(|e| Error::State(format!("Failed to open table: {e}")))?;
            for (key, value) in entries {
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(|e| Error::State(format!("Failed to insert value: {e}")))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))?;
        Ok(())
    }

    fn for_each<F>(&self, bucket: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let table_def = Self::table_def(bucket)?;
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::State(format!("Failed to begin read transaction: {e}")))?;

        let Ok(table) = read_txn.open_table(table_def) else {
            // No bucket yet
            return Ok(());
        };

        let iter = table
            .iter()
            .map_err(|e| Error::State(format!("Failed to iterate table: {e}")))?;

        for item in iter {
            let (key, value) =
                item.map_err(|e| Error::State(format!("Failed to read item: {e}")))?;
            f(key.value(), value.value())?;
        }

        Ok(())
    }
}

/// Loads and saves the learned state of a priority system
#[derive(Debug)]
pub struct HistoryStore<S: PersistentState> {
    state: S,
}

impl<S: PersistentState> HistoryStore<S> {
    /// Wrap a state backend
    pub fn new(state: S) -> Self {
        Self { state }
    }

    /// Every stored sample, sorted by hook name
    pub fn load_history(&self) -> Result<HistoryExport> {
        let mut hooks = Vec::new();
        self.state.for_each(HISTORY_BUCKET, |key, value| {
            let hook = decode_key(key)?;
            let samples: Vec<PerformanceSample> = decode(value)?;
            hooks.push((hook, samples));
            Ok(())
        })?;
        hooks.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(HistoryExport { hooks })
    }

    /// Replace the stored samples
    pub fn save_history(&self, export: &HistoryExport) -> Result<()> {
        let entries = export
            .hooks
            .iter()
            .map(|(hook, samples)| Ok((hook.as_bytes().to_vec(), encode(samples)?)))
            .collect::<Result<Vec<_>>>()?;
        self.state.replace_bucket(HISTORY_BUCKET, &entries)?;
        tracing::debug!(hooks = export.hooks.len(), "Saved performance history");
        Ok(())
    }

    /// Stored priority adjustments
    pub fn load_adjustments(&self) -> Result<BTreeMap<String, f64>> {
        let mut adjustments = BTreeMap::new();
        self.state.for_each(ADJUSTMENT_BUCKET, |key, value| {
            adjustments.insert(decode_key(key)?, decode::<f64>(value)?);
            Ok(())
        })?;
        Ok(adjustments)
    }

    /// Replace the stored priority adjustments
    pub fn save_adjustments(&self, adjustments: &BTreeMap<String, f64>) -> Result<()> {
        let entries = adjustments
            .iter()
            .map(|(hook, value)| Ok((hook.as_bytes().to_vec(), encode(value)?)))
            .collect::<Result<Vec<_>>>()?;
        self.state.replace_bucket(ADJUSTMENT_BUCKET, &entries)

    }

    /// Forget the adjustment of one hook
    pub fn clear_adjustment(&self, hook: &str) -> Result<()> {
        self.state.delete(ADJUSTMENT_BUCKET, hook.as_bytes())
    }
}

fn decode_key(key: &[u8]) -> Result<String> {
    String::from_utf8(key.to_vec()).map_err(|e| Error::State(format!("Invalid key: {e}")))
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| Error::State(format!("Failed to encode state: {e}")))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| Error::State(format!("Failed to decode state: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> HistoryStore<RedbPersistentState> {
        HistoryStore::new(RedbPersistentState::new(temp.path().join("state/state.db")).unwrap())
    }

    fn sample(duration_ms: f64, success: bool) -> PerformanceSample {
        PerformanceSample {
            recorded_at_ms: 1_700_000_000_000,
            duration_ms,
            success,
        }
    }

    #[test]
    fn test_empty_database_loads_nothing() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(store.load_history().unwrap().hooks.is_empty());
        assert!(store.load_adjustments().unwrap().is_empty());
    }

    #[test]
    fn test_history_replaced_on_save() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store
            .save_history(&HistoryExport {
                hooks: vec![("old".into(), vec![sample(1.0, true)])],
            })
            .unwrap();
        let export = HistoryExport {
            hooks: vec![
                ("lint".into(), vec![sample(12.5, true), sample(30.0, false)]),
                ("build".into(), vec![sample(900.0, true)]),
            ],
        };
        store.save_history(&export).unwrap();

        let loaded = store.load_history().unwrap();
        let names: Vec<&str> = loaded.hooks.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["build", "lint"]);
        assert_eq!(loaded.hooks[1].1, vec![sample(12.5, true), sample(30.0, false)]);
    }

    #[test]
    fn test_adjustments_survive_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let store = store(&temp);
            let adjustments = BTreeMap::from([("slow".to_string(), -0.1), ("gone".to_string(), -0.1)]);
            store.save_adjustments(&adjustments).unwrap();
            store.clear_adjustment("gone").unwrap();
        }

        let adjustments = store(&temp).load_adjustments().unwrap();
        assert_eq!(adjustments.len(), 1);
        assert!((adjustments["slow"] + 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_smaller_save_leaves_only_new_entries() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let first = BTreeMap::from([
            ("a".to_string(), 0.1),
            ("b".to_string(), -0.2),
            ("c".to_string(), 0.05),
        ]);
        store.save_adjustments(&first).unwrap();
        let second = BTreeMap::from([("b".to_string(), 0.3)]);
        store.save_adjustments(&second).unwrap();
        assert_eq!(store.load_adjustments().unwrap(), second);

        store.save_adjustments(&BTreeMap::new()).unwrap();
        assert!(store.load_adjustments().unwrap().is_empty());
    }

    #[test]
    fn test_replace_bucket_on_missing_table() {
        let temp = TempDir::new().unwrap();
        let state = RedbPersistentState::new(temp.path().join("state.db")).unwrap();
        state
            .replace_bucket(HISTORY_BUCKET, &[(b"k".to_vec(), b"v".to_vec())])
            .unwrap();
        assert_eq!(state.get(HISTORY_BUCKET, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_unknown_bucket_is_rejected() {
        let temp = TempDir::new().unwrap();
        let state = RedbPersistentState::new(temp.path().join("state.db")).unwrap();
        assert!(matches!(state.get("nope", b"k"), Err(Error::State(_))));
    }
}
