//! Cached search results: named, ordered, re-iterable snapshots of resolved
//! rows.
//!
//! The engine never decides where results live; callers hand it a handle and
//! [`crate::query::query_rows`] writes the resolved rows into it in row order.
//! Two implementations ship with the crate: a plain in-memory one and a
//! file-backed one that persists the sealed row sequence with `bincode` so it
//! can be replayed by a later handle opened on the same path.

use crate::error::EngineError;
use crate::types::DataPointRow;
use std::fs;
use std::path::{Path, PathBuf};

/// Handle to a named, ordered, re-iterable snapshot of `DataPointRow`s.
///
/// Rows are appended in order, then the handle is sealed with
/// [`CachedSearchResult::finish`]; after that the sequence is replayable via
/// [`CachedSearchResult::rows`]. Deleting data that a snapshot covers
/// invalidates the handle.
pub trait CachedSearchResult: Send {
    fn name(&self) -> &str;

    /// Appends one row. Rows must arrive in row-time order.
    fn add_row(&mut self, row: &DataPointRow) -> Result<(), EngineError>;

    /// Seals the snapshot; no further rows may be added.
    fn finish(&mut self) -> Result<(), EngineError>;

    /// Replays the snapshot from the start.
    fn rows(&self) -> Result<Vec<DataPointRow>, EngineError>;

    /// Marks the snapshot stale (the store changed underneath it).
    fn invalidate(&mut self);

    fn is_valid(&self) -> bool;
}

/// In-memory cached result. Cheap, process-local, gone on drop.
#[derive(Debug)]
pub struct MemoryCachedResult {
    name: String,
    rows: Vec<DataPointRow>,
    sealed: bool,
    valid: bool,
}

impl MemoryCachedResult {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryCachedResult {
            name: name.into(),
            rows: Vec::new(),
            sealed: false,
            valid: true,
        }
    }
}

impl CachedSearchResult for MemoryCachedResult {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_row(&mut self, row: &DataPointRow) -> Result<(), EngineError> {
        if self.sealed {
            return Err(EngineError::Cache(format!(
                "result '{}' is sealed",
                self.name
            )));
        }
        self.rows.push(row.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EngineError> {
        self.sealed = true;
        Ok(())
    }

    fn rows(&self) -> Result<Vec<DataPointRow>, EngineError> {
        Ok(self.rows.clone())
    }

    fn invalidate(&mut self) {
        self.valid = false;
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// File-backed cached result persisted at a caller-supplied path.
#[derive(Debug)]
pub struct FileCachedResult {
    name: String,
    path: PathBuf,
    pending: Vec<DataPointRow>,
    sealed: bool,
    valid: bool,
    // Keeps a temp dir alive for handles created via `create_temp_result`.
    _tmp_dir: Option<tempfile::TempDir>,
}

impl FileCachedResult {
    /// Opens a previously sealed result at `path` for replay.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        FileCachedResult {
            name: name.into(),
            path: path.into(),
            pending: Vec::new(),
            sealed: true,
            valid: true,
            _tmp_dir: None,
        }
    }
}

impl CachedSearchResult for FileCachedResult {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_row(&mut self, row: &DataPointRow) -> Result<(), EngineError> {
        if self.sealed {
            return Err(EngineError::Cache(format!(
                "result '{}' is sealed",
                self.name
            )));
        }
        self.pending.push(row.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EngineError> {
        let bytes = bincode::serialize(&self.pending)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        fs::write(&self.path, bytes)?;
        self.pending.clear();
        self.sealed = true;
        Ok(())
    }

    fn rows(&self) -> Result<Vec<DataPointRow>, EngineError> {
        if !self.sealed {
            return Ok(self.pending.clone());
        }
        let bytes = fs::read(&self.path)?;
        bincode::deserialize(&bytes).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    fn invalidate(&mut self) {
        self.valid = false;
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Creates a fresh named result stored under `dir`.
pub fn create_named_result(
    name: &str,
    dir: impl AsRef<Path>,
) -> Result<FileCachedResult, EngineError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    Ok(FileCachedResult {
        name: name.to_string(),
        path: dir.join(format!("{}.rows", name)),
        pending: Vec::new(),
        sealed: false,
        valid: true,
        _tmp_dir: None,
    })
}

/// Creates a fresh named result in a private temp directory that lives as
/// long as the handle does.
pub fn create_temp_result(name: &str) -> Result<FileCachedResult, EngineError> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join(format!("{}.rows", name));
    Ok(FileCachedResult {
        name: name.to_string(),
        path,
        pending: Vec::new(),
        sealed: false,
        valid: true,
        _tmp_dir: Some(tmp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rowkey::{RowKey, DEFAULT_ROW_WIDTH_MS};
    use crate::types::{DataPoint, TagSet};

    fn row(metric: &str, row_ts: i64, values: &[i64]) -> DataPointRow {
        DataPointRow {
            key: RowKey::new(metric, &TagSet::new(), row_ts, DEFAULT_ROW_WIDTH_MS),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &v)| DataPoint::new_long(row_ts + i as i64, v))
                .collect(),
        }
    }

    #[test]
    fn memory_result_replays_in_order() {
        let mut cache = MemoryCachedResult::new("r");
        cache.add_row(&row("m", 0, &[1, 2])).unwrap();
        cache.add_row(&row("m", DEFAULT_ROW_WIDTH_MS, &[3])).unwrap();
        cache.finish().unwrap();

        let rows = cache.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].points.len(), 2);
        assert!(rows[0].key.row_time() < rows[1].key.row_time());
    }

    #[test]
    fn sealed_result_rejects_more_rows() {
        let mut cache = MemoryCachedResult::new("r");
        cache.finish().unwrap();
        assert!(cache.add_row(&row("m", 0, &[1])).is_err());
    }

    #[test]
    fn file_result_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = create_named_result("roundtrip", dir.path()).unwrap();
        cache.add_row(&row("m", 0, &[7, 8, 9])).unwrap();
        cache.finish().unwrap();

        let rows = cache.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].points[2], DataPoint::new_long(2, 9));

        // A second handle on the same path replays the same snapshot.
        let reopened = FileCachedResult::open("roundtrip", dir.path().join("roundtrip.rows"));
        assert_eq!(reopened.rows().unwrap(), rows);
    }

    #[test]
    fn temp_result_is_usable_without_a_caller_path() {
        let mut cache = create_temp_result("scratch").unwrap();
        cache.add_row(&row("m", 0, &[1])).unwrap();
        cache.finish().unwrap();
        assert_eq!(cache.rows().unwrap().len(), 1);
    }

    #[test]
    fn invalidate_flags_the_handle() {
        let mut cache = MemoryCachedResult::new("r");
        assert!(cache.is_valid());
        cache.invalidate();
        assert!(!cache.is_valid());
    }
}
