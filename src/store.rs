//! The column-family store seam and an in-memory implementation of it.
//!
//! The engine never talks to a concrete store driver; everything below this
//! trait (replication, consistency levels, client pooling) belongs to the
//! collaborator. `MemoryStore` implements the same contract for tests, demos,
//! and embedding.

use crate::error::EngineError;
use crate::rowkey::{ColumnTime, RowKey};
use crate::types::PointValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// A single column read back from a row: the point's offset from the row
/// start plus its typed payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub offset: ColumnTime,
    pub value: PointValue,
}

/// Minimal contract the engine requires from the underlying store.
///
/// All operations are idempotent: `write_column` is an upsert (last write
/// wins on the same (row, offset)), and deleting absent rows or columns is a
/// no-op. Implementations must be safe for concurrent invocation; the engine
/// fans out per-row operations without a global lock.
pub trait ColumnFamilyStore: Send + Sync {
    /// Upserts one column.
    fn write_column(
        &self,
        key: &RowKey,
        offset: ColumnTime,
        value: PointValue,
    ) -> Result<(), EngineError>;

    /// Reads at most `limit` columns with offsets in `[from, to]`, ascending
    /// by offset. Returns an empty vec if none. Returning more than `limit`
    /// columns, or columns out of order, is a protocol violation the query
    /// path treats as fatal.
    fn read_columns(
        &self,
        key: &RowKey,
        from: ColumnTime,
        to: ColumnTime,
        limit: usize,
    ) -> Result<Vec<Column>, EngineError>;

    /// Removes the row and all of its columns.
    fn delete_row(&self, key: &RowKey) -> Result<(), EngineError>;

    /// Removes the columns with offsets in `[from, to]`, leaving the rest of
    /// the row intact.
    fn delete_columns(&self, key: &RowKey, from: ColumnTime, to: ColumnTime)
        -> Result<(), EngineError>;
}

/// In-memory column-family store: one ordered column map per row key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<RowKey, BTreeMap<ColumnTime, PointValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently holding at least one column.
    pub fn row_count(&self) -> usize {
        let guard = self.rows.read().expect("memory store lock");
        guard.values().filter(|cols| !cols.is_empty()).count()
    }

    /// Number of columns in the given row (0 if the row is absent or empty).
    pub fn column_count(&self, key: &RowKey) -> usize {
        let guard = self.rows.read().expect("memory store lock");
        guard.get(key).map(|cols| cols.len()).unwrap_or(0)
    }
}

impl ColumnFamilyStore for MemoryStore {
    fn write_column(
        &self,
        key: &RowKey,
        offset: ColumnTime,
        value: PointValue,
    ) -> Result<(), EngineError> {
        let mut guard = self.rows.write()?;
        guard.entry(key.clone()).or_default().insert(offset, value);
        Ok(())
    }

    fn read_columns(
        &self,
        key: &RowKey,
        from: ColumnTime,
        to: ColumnTime,
        limit: usize,
    ) -> Result<Vec<Column>, EngineError> {
        if from > to {
            return Ok(Vec::new());
        }
        let guard = self.rows.read()?;
        let columns = match guard.get(key) {
            Some(cols) => cols
                .range(from..=to)
                .take(limit)
                .map(|(&offset, &value)| Column { offset, value })
                .collect(),
            None => Vec::new(),
        };
        Ok(columns)
    }

    fn delete_row(&self, key: &RowKey) -> Result<(), EngineError> {
        let mut guard = self.rows.write()?;
        guard.remove(key);
        Ok(())
    }

    fn delete_columns(
        &self,
        key: &RowKey,
        from: ColumnTime,
        to: ColumnTime,
    ) -> Result<(), EngineError> {
        if from > to {
            return Ok(());
        }
        let mut guard = self.rows.write()?;
        if let Some(cols) = guard.get_mut(key) {
            // The row itself survives even if every column goes; index skew
            // toward empty rows is benign.
            cols.retain(|offset, _| *offset < from || *offset > to);
        }
        Ok(())
    }
}
