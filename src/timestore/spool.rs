//! Crash-safe embedded staging spool (spec §4.7 step 5): a `redb`-backed
//! key-value store holding a staging batch's row data in arrival order, so
//! rows survive a process restart between being accepted and being flushed
//! into a partition. The metadata-store side of a batch's lifecycle lives
//! in `staging_batches` (see [`crate::infrastructure::database::repo::datasets`]);
//! this store only ever holds the rows themselves, addressed by the same
//! `spool_key`.

use crate::error::{CoreError, CoreResult};
use redb::{Database as RedbDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const ROWS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("staging_rows");

/// Opens (or creates) the on-disk spool file.
pub struct Spool {
    db: Arc<RedbDatabase>,
}

impl Spool {
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = RedbDatabase::create(path.as_ref())
            .map_err(|e| CoreError::StorageWriteFailed(format!("spool open: {e}")))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Append `rows` to the batch at `spool_key`, preserving arrival order.
    pub fn append(&self, spool_key: &str, rows: &[serde_json::Value]) -> CoreResult<()> {
        let mut existing = self.read(spool_key)?;
        existing.extend_from_slice(rows);
        self.write_all(spool_key, &existing)
    }

    /// Every row accumulated so far for `spool_key`, in arrival order. The
    /// authority for "how many rows are actually staged" — flush reads
    /// this directly rather than trusting the `staging_batches` counters,
    /// which are only a flush-policy hint (see module docs).
    pub fn read(&self, spool_key: &str) -> CoreResult<Vec<serde_json::Value>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| CoreError::StorageWriteFailed(format!("spool read txn: {e}")))?;
        let table = match txn.open_table(ROWS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::StorageWriteFailed(format!("spool open table: {e}"))),
        };
        match table
            .get(spool_key)
            .map_err(|e| CoreError::StorageWriteFailed(format!("spool get: {e}")))?
        {
            Some(value) => serde_json::from_slice(value.value())
                .map_err(|e| CoreError::InvariantViolation(format!("spool decode: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    fn write_all(&self, spool_key: &str, rows: &[serde_json::Value]) -> CoreResult<()> {
        let encoded = serde_json::to_vec(rows)
            .map_err(|e| CoreError::InvariantViolation(format!("spool encode: {e}")))?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| CoreError::StorageWriteFailed(format!("spool write txn: {e}")))?;
        {
            let mut table = txn
                .open_table(ROWS_TABLE)
                .map_err(|e| CoreError::StorageWriteFailed(format!("spool open table: {e}")))?;
            table
                .insert(spool_key, encoded.as_slice())
                .map_err(|e| CoreError::StorageWriteFailed(format!("spool insert: {e}")))?;
        }
        txn.commit().map_err(|e| CoreError::StorageWriteFailed(format!("spool commit: {e}")))?;
        Ok(())
    }

    /// Drop a batch's rows once its partition is durably flushed and the
    /// `staging_batches` row has been deleted in the same transaction.
    pub fn clear(&self, spool_key: &str) -> CoreResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| CoreError::StorageWriteFailed(format!("spool write txn: {e}")))?;
        {
            let mut table = txn
                .open_table(ROWS_TABLE)
                .map_err(|e| CoreError::StorageWriteFailed(format!("spool open table: {e}")))?;
            table
                .remove(spool_key)
                .map_err(|e| CoreError::StorageWriteFailed(format!("spool remove: {e}")))?;
        }
        txn.commit().map_err(|e| CoreError::StorageWriteFailed(format!("spool commit: {e}")))?;
        Ok(())
    }

    /// Every `spool_key` with rows still pending — used at startup to
    /// recover batches that were appended but never flushed before a
    /// restart (spec §4.7 Recovery).
    pub fn pending_keys(&self) -> CoreResult<Vec<String>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| CoreError::StorageWriteFailed(format!("spool read txn: {e}")))?;
        let table = match txn.open_table(ROWS_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::StorageWriteFailed(format!("spool open table: {e}"))),
        };
        let mut keys = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| CoreError::StorageWriteFailed(format!("spool iter: {e}")))?
        {
            let (key, _) = entry.map_err(|e| CoreError::StorageWriteFailed(format!("spool iter entry: {e}")))?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(dir.path().join("spool.redb")).unwrap();
        spool.append("ds1:sig1", &[serde_json::json!({"a": 1})]).unwrap();
        spool.append("ds1:sig1", &[serde_json::json!({"a": 2})]).unwrap();
        let rows = spool.read("ds1:sig1").unwrap();
        assert_eq!(rows, vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2})]);
    }

    #[test]
    fn missing_key_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(dir.path().join("spool.redb")).unwrap();
        assert!(spool.read("nope").unwrap().is_empty());
    }

    #[test]
    fn clear_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(dir.path().join("spool.redb")).unwrap();
        spool.append("k", &[serde_json::json!(1)]).unwrap();
        spool.clear("k").unwrap();
        assert!(spool.read("k").unwrap().is_empty());
    }

    #[test]
    fn pending_keys_lists_unflushed_batches() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(dir.path().join("spool.redb")).unwrap();
        spool.append("a", &[serde_json::json!(1)]).unwrap();
        spool.append("b", &[serde_json::json!(2)]).unwrap();
        spool.clear("a").unwrap();
        assert_eq!(spool.pending_keys().unwrap(), vec!["b".to_string()]);
    }
}
