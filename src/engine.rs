//! Engine: the single instance owning the index, the store handle, and the
//! tuning knobs, passed explicitly to everything. No ambient singletons.

use crate::cache::CachedSearchResult;
use crate::delete::delete_points;
use crate::error::EngineError;
use crate::index::TagIndex;
use crate::query::{keys_for_query, query_rows, MetricQuery, PointStream};
use crate::rowkey::{RowKey, DEFAULT_ROW_WIDTH_MS};
use crate::store::ColumnFamilyStore;
use crate::telemetry::{noop_event_listener, EngineEventListener};
use crate::types::{DataPointRow, DataPointSet, Timestamp};
use crate::write::{write_points, RowKeyCache};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Default cap on columns fetched per page read.
pub const DEFAULT_PAGE_SIZE: usize = 1024;

/// Default capacity of the recently-indexed row-key cache.
pub const DEFAULT_ROW_KEY_CACHE_SIZE: usize = 1024;

/// Tuning knobs for the engine. Loading them from files or flags is the
/// caller's business; only the values are consumed here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed duration of one row bucket. Balances scan cost (wider rows, fewer
    /// seeks) against row fan-out.
    pub row_width: Duration,
    /// Maximum columns fetched per store read; bounds memory and per-request
    /// store load. Rows wider than this are stitched from multiple pages.
    pub page_size: usize,
    /// Capacity of the write path's recently-indexed row-key cache.
    pub row_key_cache_size: usize,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn EngineEventListener>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            row_width: Duration::from_millis(DEFAULT_ROW_WIDTH_MS as u64),
            page_size: DEFAULT_PAGE_SIZE,
            row_key_cache_size: DEFAULT_ROW_KEY_CACHE_SIZE,
            event_listener: noop_event_listener(),
        }
    }
}

/// The time-series storage engine over a column-family store.
///
/// Owns the reverse tag index and the store handle; all operations take
/// `&self` and are safe for concurrent invocation.
#[derive(Debug)]
pub struct Engine<S: ColumnFamilyStore> {
    store: S,
    index: TagIndex,
    row_key_cache: RowKeyCache,
    config: EngineConfig,
    row_width_ms: i64,
}

impl<S: ColumnFamilyStore> Engine<S> {
    /// Creates an engine with default configuration (3-week rows, 1024-column
    /// pages).
    ///
    /// # Panics
    /// Panics if the default configuration is rejected, which cannot happen.
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
            .expect("default engine configuration is valid")
    }

    /// Creates an engine with the provided configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if the row width is shorter than a millisecond,
    /// does not fit a signed 64-bit millisecond count, or the page size is 0.
    pub fn with_config(store: S, config: EngineConfig) -> Result<Self, EngineError> {
        let row_width_ms = i64::try_from(config.row_width.as_millis()).map_err(|_| {
            EngineError::ConfigError("row width exceeds the representable range".to_string())
        })?;
        if row_width_ms < 1 {
            return Err(EngineError::ConfigError(
                "row width must be at least one millisecond".to_string(),
            ));
        }
        if config.page_size == 0 {
            return Err(EngineError::ConfigError(
                "page size must be non-zero".to_string(),
            ));
        }
        Ok(Engine {
            store,
            index: TagIndex::new(),
            row_key_cache: RowKeyCache::new(config.row_key_cache_size),
            row_width_ms,
            config,
        })
    }

    /// Writes one batch of data points, bucketing them into rows and keeping
    /// the tag index current. Returns the number of points written.
    ///
    /// Best-effort: groups that fail do not roll back groups already written;
    /// the first failure surfaces after the batch completes, and retrying is
    /// safe because writes are idempotent upserts.
    pub fn put(&self, set: &DataPointSet) -> Result<usize, EngineError> {
        write_points(
            &self.store,
            &self.index,
            &self.row_key_cache,
            &self.config.event_listener,
            set,
            self.row_width_ms,
        )
    }

    /// Resolves the row keys matching `query`, grouped by row start time.
    pub fn keys_for_query(
        &self,
        query: &MetricQuery,
    ) -> Result<BTreeMap<Timestamp, Vec<RowKey>>, EngineError> {
        keys_for_query(&self.index, query, self.row_width_ms)
    }

    /// Opens a lazy, time-ordered stream over every point matching `query`.
    ///
    /// An unknown metric or tag combination yields an empty stream, not an
    /// error. Dropping the stream releases it; call
    /// [`PointStream::close`] to stop reading early.
    pub fn stream(&self, query: &MetricQuery) -> Result<PointStream<'_, S>, EngineError> {
        let keys: Vec<RowKey> = self
            .keys_for_query(query)?
            .into_values()
            .flatten()
            .collect();
        Ok(PointStream::new(
            &self.store,
            self.config.event_listener.clone(),
            query.clone(),
            keys,
            self.row_width_ms,
            self.config.page_size,
        ))
    }

    /// Materializes every row matching `query` into `cache` (in row order)
    /// and returns the rows. Rows the index references but that hold no
    /// matching columns are filtered out silently.
    pub fn query_rows(
        &self,
        query: &MetricQuery,
        cache: &mut dyn CachedSearchResult,
    ) -> Result<Vec<DataPointRow>, EngineError> {
        query_rows(
            &self.store,
            &self.index,
            &self.config.event_listener,
            query,
            self.row_width_ms,
            self.config.page_size,
            cache,
        )
    }

    /// Deletes every point matching `query`: whole rows where the range fully
    /// covers them (pruning the index afterwards), column ranges where it
    /// does not. Invalidates `cache`. Idempotent.
    pub fn delete(
        &self,
        query: &MetricQuery,
        cache: &mut dyn CachedSearchResult,
    ) -> Result<(), EngineError> {
        let deleted = delete_points(
            &self.store,
            &self.index,
            &self.config.event_listener,
            query,
            self.row_width_ms,
            cache,
        );
        // Pruned keys must not linger in the write path's cache, or a later
        // write would skip re-indexing a row the index no longer knows. Rows
        // may already have been pruned even when the delete surfaced an error
        // (it is best-effort across rows), so clear unconditionally.
        let cleared = self.row_key_cache.clear();
        deleted.and(cleared)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The configured row width in milliseconds.
    pub fn row_width_ms(&self) -> i64 {
        self.row_width_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::TagSet;

    #[test]
    fn rejects_zero_page_size() {
        let config = EngineConfig {
            page_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::with_config(MemoryStore::new(), config),
            Err(EngineError::ConfigError(_))
        ));
    }

    #[test]
    fn rejects_sub_millisecond_row_width() {
        let config = EngineConfig {
            row_width: Duration::from_micros(10),
            ..EngineConfig::default()
        };
        assert!(Engine::with_config(MemoryStore::new(), config).is_err());
    }

    #[test]
    fn put_then_stream_round_trip() {
        let engine = Engine::new(MemoryStore::new());
        let mut set = DataPointSet::new("m");
        set.add_tag("host", "A");
        set.add_long(100, 1);
        set.add_long(200, 2);
        assert_eq!(engine.put(&set).unwrap(), 2);

        let query = MetricQuery::new("m", TagSet::new(), 0, 1000).unwrap();
        let points: Vec<_> = engine
            .stream(&query)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, 100);
        assert_eq!(points[1].timestamp, 200);
    }

    #[test]
    fn unknown_metric_streams_empty() {
        let engine = Engine::new(MemoryStore::new());
        let query = MetricQuery::new("ghost", TagSet::new(), 0, i64::MAX).unwrap();
        assert_eq!(engine.stream(&query).unwrap().count(), 0);
    }
}
