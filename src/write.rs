//! Write path: bucket points into rows, upsert columns, maintain the index.

use crate::error::EngineError;
use crate::index::TagIndex;
use crate::rowkey::{column_time, RowKey};
use crate::store::ColumnFamilyStore;
use crate::telemetry::{EngineEvent, EngineEventListener};
use crate::types::{DataPoint, DataPointSet};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Bounded write-back cache of recently indexed row keys.
///
/// Index entries are written once per (row key, batch); most batches keep
/// hitting the same current-bucket row, so remembering what was already
/// indexed avoids re-writing the same entries on every `put`. Purely an
/// optimization: a miss only costs a redundant idempotent index write.
/// When full the cache is cleared wholesale rather than tracking recency.
#[derive(Debug)]
pub struct RowKeyCache {
    seen: Mutex<HashSet<RowKey>>,
    capacity: usize,
}

impl RowKeyCache {
    pub fn new(capacity: usize) -> Self {
        RowKeyCache {
            seen: Mutex::new(HashSet::new()),
            capacity,
        }
    }

    /// Returns `true` if `key` is currently cached.
    fn contains(&self, key: &RowKey) -> Result<bool, EngineError> {
        if self.capacity == 0 {
            return Ok(false);
        }
        Ok(self.seen.lock()?.contains(key))
    }

    /// Caches `key`. Callers mark a key only once its index entry is written;
    /// a cached key with no entry would make later writes skip indexing it.
    fn remember(&self, key: &RowKey) -> Result<(), EngineError> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut guard = self.seen.lock()?;
        if guard.len() >= self.capacity {
            guard.clear();
        }
        guard.insert(key.clone());
        Ok(())
    }

    /// Forgets everything. Must be called whenever rows are pruned from the
    /// index, otherwise a later write could skip re-indexing a row the index
    /// no longer knows about.
    pub fn clear(&self) -> Result<(), EngineError> {
        self.seen.lock()?.clear();
        Ok(())
    }
}

/// Writes one `DataPointSet` batch.
///
/// Points are grouped by row key (a single set may span several buckets) and
/// the groups fan out in parallel: row keys are independent units with no
/// cross-row ordering requirement. Within a group a single `index_row` for
/// the group's key precedes the column upserts, so the index can reference
/// every column that ever lands, even across a mid-group failure.
///
/// Best-effort semantics: all groups are attempted; if any failed, the first
/// error is surfaced after the batch completes. On success returns the number
/// of points written. Duplicate (row, offset) pairs resolve last-write-wins
/// at the store.
pub fn write_points<S: ColumnFamilyStore>(
    store: &S,
    index: &TagIndex,
    row_key_cache: &RowKeyCache,
    events: &Arc<dyn EngineEventListener>,
    set: &DataPointSet,
    row_width: i64,
) -> Result<usize, EngineError> {
    if set.points.is_empty() {
        return Ok(0);
    }

    let mut groups: HashMap<RowKey, Vec<DataPoint>> = HashMap::new();
    for point in &set.points {
        let key = RowKey::new(&set.metric, &set.tags, point.timestamp, row_width);
        groups.entry(key).or_default().push(*point);
    }

    let row_count = groups.len();
    let results: Vec<Result<usize, EngineError>> = groups
        .into_par_iter()
        .map(|(key, points)| {
            // Index entry first: an entry pointing at a still-empty row is
            // benign skew, a row the index omits is not. Should the column
            // writes below fail partway, whatever landed stays reachable.
            if !row_key_cache.contains(&key)? {
                index.index_row(&key)?;
                row_key_cache.remember(&key)?;
            }
            let row_start = key.row_time();
            for point in &points {
                store.write_column(&key, column_time(point.timestamp, row_start), point.value)?;
            }
            Ok(points.len())
        })
        .collect();

    let mut written = 0;
    let mut first_error = None;
    for result in results {
        match result {
            Ok(count) => written += count,
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(error) => {
            events.on_event(EngineEvent::WriteBatchPartialFailure {
                metric: set.metric.clone(),
                written,
                error: error.to_string(),
            });
            Err(error)
        }
        None => {
            events.on_event(EngineEvent::WriteBatchCommitted {
                metric: set.metric.clone(),
                points: written,
                rows: row_count,
            });
            Ok(written)
        }
    }
}
