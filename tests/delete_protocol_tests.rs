//! Deletion protocol: whole-row, multi-row-spanning, and partial in-row
//! deletes, index consistency, and idempotency.

use widerow::{
    rowkey, DataPointSet, Engine, MemoryCachedResult, MemoryStore, MetricQuery, TagSet,
    DEFAULT_ROW_WIDTH_MS,
};

fn cache(name: &str) -> MemoryCachedResult {
    MemoryCachedResult::new(name)
}

fn full_range(metric: &str) -> MetricQuery {
    MetricQuery::new(metric, TagSet::new(), 0, i64::MAX).unwrap()
}

// One row of four points at 1s spacing from the bucket start, host/client
// tagged, as a delete target.
fn load_single_row(engine: &Engine<MemoryStore>, metric: &str, base_ts: i64) -> i64 {
    let row_time = rowkey::row_time(base_ts, DEFAULT_ROW_WIDTH_MS);
    let mut set = DataPointSet::new(metric);
    set.add_tag("host", "A");
    set.add_tag("client", "bar");
    set.add_long(row_time, 13);
    set.add_long(row_time + 1000, 14);
    set.add_long(row_time + 2000, 15);
    set.add_long(row_time + 3000, 16);
    engine.put(&set).unwrap();
    row_time
}

#[test]
fn delete_entire_row() {
    let engine = Engine::new(MemoryStore::new());
    let base_ts = 10 * DEFAULT_ROW_WIDTH_MS + 5000;
    load_single_row(&engine, "metric_to_delete", base_ts);

    let query = full_range("metric_to_delete");
    let rows = engine.query_rows(&query, &mut cache("before")).unwrap();
    assert_eq!(rows.len(), 1);

    engine.delete(&query, &mut cache("delete")).unwrap();

    let rows = engine.query_rows(&query, &mut cache("after")).unwrap();
    assert_eq!(rows.len(), 0);
    // The index was pruned, not just the data removed.
    assert!(engine.keys_for_query(&query).unwrap().is_empty());
}

#[test]
fn delete_columns_spanning_rows() {
    let engine = Engine::new(MemoryStore::new());
    let w = DEFAULT_ROW_WIDTH_MS;
    let row_time = rowkey::row_time(10 * w + 5000, w);

    let mut set = DataPointSet::new("other_metric_to_delete");
    set.add_tag("host", "B");
    set.add_tag("client", "bar");
    set.add_long(row_time + 2 * w, 15);
    set.add_long(row_time, 13);
    set.add_long(row_time + 3 * w, 16);
    set.add_long(row_time + w, 14);
    engine.put(&set).unwrap();

    let query = full_range("other_metric_to_delete");
    let rows = engine.query_rows(&query, &mut cache("before")).unwrap();
    assert_eq!(rows.len(), 4);

    engine.delete(&query, &mut cache("delete")).unwrap();

    let rows = engine.query_rows(&query, &mut cache("after")).unwrap();
    assert_eq!(rows.len(), 0);
}

#[test]
fn delete_columns_within_row() {
    let engine = Engine::new(MemoryStore::new());
    let base_ts = 10 * DEFAULT_ROW_WIDTH_MS + 5000;
    let row_time = load_single_row(&engine, "yet_another_metric_to_delete", base_ts);

    let sub_range = MetricQuery::new(
        "yet_another_metric_to_delete",
        TagSet::new(),
        row_time,
        row_time + 2000,
    )
    .unwrap();

    let rows = engine.query_rows(&sub_range, &mut cache("before")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].points.len(), 3);

    engine.delete(&sub_range, &mut cache("delete")).unwrap();

    // Nothing left inside the deleted sub-range...
    let rows = engine.query_rows(&sub_range, &mut cache("after")).unwrap();
    assert_eq!(rows.len(), 0);

    // ...but the column outside it is still readable, and the row is still
    // indexed (partial deletes never prune).
    let all = full_range("yet_another_metric_to_delete");
    let rows = engine.query_rows(&all, &mut cache("all")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].points.len(), 1);
    assert_eq!(rows[0].points[0].timestamp, row_time + 3000);
    assert!(!engine.keys_for_query(&all).unwrap().is_empty());
}

#[test]
fn delete_only_covered_rows_of_a_spanning_range() {
    let engine = Engine::new(MemoryStore::new());
    let w = DEFAULT_ROW_WIDTH_MS;

    let mut set = DataPointSet::new("boundary");
    set.add_tag("host", "A");
    for bucket in 0..3 {
        for k in 0..4 {
            set.add_long(bucket * w + k * 1000, 1);
        }
    }
    engine.put(&set).unwrap();

    // Covers bucket 1 fully, bucket 0 only from its third point onward, and
    // bucket 2 only through its first two points.
    let query = MetricQuery::new("boundary", TagSet::new(), 2000, 2 * w + 1000).unwrap();
    engine.delete(&query, &mut cache("delete")).unwrap();

    let rows = engine
        .query_rows(&full_range("boundary"), &mut cache("after"))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key.row_time(), 0);
    assert_eq!(
        rows[0].points.iter().map(|p| p.timestamp).collect::<Vec<_>>(),
        vec![0, 1000]
    );
    assert_eq!(rows[1].key.row_time(), 2 * w);
    assert_eq!(
        rows[1].points.iter().map(|p| p.timestamp).collect::<Vec<_>>(),
        vec![2 * w + 2000, 2 * w + 3000]
    );

    // The middle bucket's key is gone from the index entirely.
    let keys = engine.keys_for_query(&full_range("boundary")).unwrap();
    assert_eq!(keys.keys().copied().collect::<Vec<_>>(), vec![0, 2 * w]);
}

#[test]
fn delete_is_idempotent() {
    let engine = Engine::new(MemoryStore::new());
    let base_ts = 10 * DEFAULT_ROW_WIDTH_MS + 5000;
    load_single_row(&engine, "repeat_delete", base_ts);

    let query = full_range("repeat_delete");
    engine.delete(&query, &mut cache("first")).unwrap();
    engine.delete(&query, &mut cache("second")).unwrap();

    assert!(engine
        .query_rows(&query, &mut cache("after"))
        .unwrap()
        .is_empty());
}

#[test]
fn partial_delete_leaves_empty_indexed_row_benign() {
    // Delete every column of a row through the partial path: the index still
    // references the emptied row, and queries silently skip it.
    let engine = Engine::new(MemoryStore::new());
    let base_ts = 10 * DEFAULT_ROW_WIDTH_MS + 5000;
    let row_time = load_single_row(&engine, "emptied", base_ts);

    let sub_range =
        MetricQuery::new("emptied", TagSet::new(), row_time, row_time + 3000).unwrap();
    engine.delete(&sub_range, &mut cache("delete")).unwrap();

    let all = full_range("emptied");
    assert!(!engine.keys_for_query(&all).unwrap().is_empty());
    assert!(engine.query_rows(&all, &mut cache("after")).unwrap().is_empty());
    assert_eq!(engine.stream(&all).unwrap().count(), 0);
}

#[test]
fn rewrite_after_full_delete_is_visible() {
    // The write path's recently-indexed cache must not mask re-indexing of a
    // row key that was pruned by a delete.
    let engine = Engine::new(MemoryStore::new());
    let base_ts = 10 * DEFAULT_ROW_WIDTH_MS + 5000;
    load_single_row(&engine, "phoenix", base_ts);

    let query = full_range("phoenix");
    engine.delete(&query, &mut cache("delete")).unwrap();
    assert!(engine.keys_for_query(&query).unwrap().is_empty());

    load_single_row(&engine, "phoenix", base_ts);
    let rows = engine.query_rows(&query, &mut cache("after")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].points.len(), 4);
}

#[test]
fn rewrite_after_failed_spanning_delete_is_visible() {
    use widerow::{Column, ColumnFamilyStore, EngineError, PointValue, RowKey};

    // Column-range deletes fail; whole-row deletes (and everything else) work.
    #[derive(Debug)]
    struct BrokenColumnDeleteStore {
        inner: MemoryStore,
    }

    impl ColumnFamilyStore for BrokenColumnDeleteStore {
        fn write_column(
            &self,
            key: &RowKey,
            offset: i64,
            value: PointValue,
        ) -> Result<(), EngineError> {
            self.inner.write_column(key, offset, value)
        }

        fn read_columns(
            &self,
            key: &RowKey,
            from: i64,
            to: i64,
            limit: usize,
        ) -> Result<Vec<Column>, EngineError> {
            self.inner.read_columns(key, from, to, limit)
        }

        fn delete_row(&self, key: &RowKey) -> Result<(), EngineError> {
            self.inner.delete_row(key)
        }

        fn delete_columns(&self, _key: &RowKey, _from: i64, _to: i64) -> Result<(), EngineError> {
            Err(EngineError::Store("column delete timed out".to_string()))
        }
    }

    let engine = Engine::new(BrokenColumnDeleteStore {
        inner: MemoryStore::new(),
    });
    let w = DEFAULT_ROW_WIDTH_MS;

    let mut set = DataPointSet::new("half_deleted");
    set.add_tag("host", "A");
    set.add_long(100, 1);
    set.add_long(w + 100, 2);
    engine.put(&set).unwrap();

    // Fully covers bucket 0 (row delete and prune go through), partially
    // covers bucket 1 (the column-range delete fails). The delete as a whole
    // errors, but bucket 0 was already pruned.
    let spanning = MetricQuery::new("half_deleted", TagSet::new(), 0, w + 1000).unwrap();
    assert!(engine.delete(&spanning, &mut cache("delete")).is_err());

    // A later write into the pruned bucket must be re-indexed and queryable,
    // failed delete or not.
    let mut set = DataPointSet::new("half_deleted");
    set.add_tag("host", "A");
    set.add_long(200, 3);
    engine.put(&set).unwrap();

    let bucket0 = MetricQuery::new("half_deleted", TagSet::new(), 0, w - 1).unwrap();
    assert!(!engine.keys_for_query(&bucket0).unwrap().is_empty());
    let rows = engine.query_rows(&bucket0, &mut cache("after")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].points.len(), 1);
    assert_eq!(rows[0].points[0].timestamp, 200);
}

#[test]
fn delete_invalidates_supplied_cache_handle() {
    use widerow::CachedSearchResult;

    let engine = Engine::new(MemoryStore::new());
    let base_ts = 10 * DEFAULT_ROW_WIDTH_MS + 5000;
    load_single_row(&engine, "stale", base_ts);

    let query = full_range("stale");
    let mut handle = cache("stale");
    engine.query_rows(&query, &mut handle).unwrap();
    assert!(handle.is_valid());

    let mut handle = cache("stale_delete");
    engine.delete(&query, &mut handle).unwrap();
    assert!(!handle.is_valid());
}
