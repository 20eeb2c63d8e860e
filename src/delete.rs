//! Delete path: whole-row, multi-row-spanning, and partial in-row deletion,
//! with index pruning kept consistent.

use crate::cache::CachedSearchResult;
use crate::error::EngineError;
use crate::index::TagIndex;
use crate::query::{keys_for_query, MetricQuery};
use crate::rowkey::RowKey;
use crate::store::ColumnFamilyStore;
use crate::telemetry::{EngineEvent, EngineEventListener};
use rayon::prelude::*;
use std::sync::Arc;

/// Deletes every data point matched by `query`.
///
/// Rows are resolved exactly as the query path resolves them, then handled
/// independently, fanned out in parallel:
///
/// - a row whose `[row_time, row_time + row_width)` interval lies fully inside
///   `[start, end]` is removed wholesale, and only after the store
///   acknowledges the delete is the key pruned from the index. Pruning first
///   would let a concurrent re-resolve miss the row while its data still
///   exists;
/// - a partially covered row gets a column-range delete over the clamped
///   offset window and keeps its index entries: columns outside the window
///   may remain, and the index tolerates pointing at emptied rows.
///
/// Deletion is not atomic across rows; a failure partway leaves some rows
/// deleted and others untouched. Re-running the same delete converges, since
/// both delete primitives are idempotent. The supplied cached-result handle
/// is invalidated: its snapshot no longer reflects the store.
pub fn delete_points<S: ColumnFamilyStore>(
    store: &S,
    index: &TagIndex,
    events: &Arc<dyn EngineEventListener>,
    query: &MetricQuery,
    row_width: i64,
    cache: &mut dyn CachedSearchResult,
) -> Result<(), EngineError> {
    let keys: Vec<RowKey> = keys_for_query(index, query, row_width)?
        .into_values()
        .flatten()
        .collect();

    let results: Vec<Result<(), EngineError>> = keys
        .into_par_iter()
        .map(|key| delete_one_row(store, index, events, &key, query, row_width))
        .collect();

    cache.invalidate();

    for result in results {
        result?;
    }
    Ok(())
}

fn delete_one_row<S: ColumnFamilyStore>(
    store: &S,
    index: &TagIndex,
    events: &Arc<dyn EngineEventListener>,
    key: &RowKey,
    query: &MetricQuery,
    row_width: i64,
) -> Result<(), EngineError> {
    let row_start = key.row_time();
    let row_last = row_start.saturating_add(row_width - 1);

    if query.start() <= row_start && row_last <= query.end() {
        // Whole row covered. Delete first, prune only once the delete is
        // acknowledged.
        store.delete_row(key)?;
        events.on_event(EngineEvent::RowDeleted {
            metric: key.metric().to_string(),
            row_time: row_start,
        });
        index.prune(key)?;
        events.on_event(EngineEvent::IndexPruned {
            metric: key.metric().to_string(),
            row_time: row_start,
        });
    } else {
        let from = query.start().max(row_start) - row_start;
        let to = query.end().min(row_last) - row_start;
        store.delete_columns(key, from, to)?;
        events.on_event(EngineEvent::ColumnsDeleted {
            metric: key.metric().to_string(),
            row_time: row_start,
            from,
            to,
        });
    }
    Ok(())
}
