//! Query path: resolve a metric + tag filter + time range to row keys, then
//! to a merged, time-ordered, lazily-paged stream of data points.
//!
//! A row whose column count exceeds the page size is stitched together from
//! successive bounded reads, each starting just after the last offset the
//! previous page returned. The consumer sees one continuous stream; the page
//! size only bounds memory and per-request store load.

use crate::cache::CachedSearchResult;
use crate::error::EngineError;
use crate::index::TagIndex;
use crate::rowkey::{ColumnTime, RowKey};
use crate::store::{Column, ColumnFamilyStore};
use crate::telemetry::{EngineEvent, EngineEventListener};
use crate::types::{DataPoint, DataPointRow, TagSet, Timestamp};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A resolved query: metric, required tag constraints, inclusive time range.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    metric: String,
    tag_filter: TagSet,
    start: Timestamp,
    end: Timestamp,
}

impl MetricQuery {
    /// Validates the range before any store interaction; `start > end` is
    /// rejected synchronously and never retried.
    pub fn new(
        metric: impl Into<String>,
        tag_filter: TagSet,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidTimeRange { start, end });
        }
        Ok(MetricQuery {
            metric: metric.into(),
            tag_filter,
            start,
            end,
        })
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn tag_filter(&self) -> &TagSet {
        &self.tag_filter
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }
}

/// True if the row interval `[row_time, row_time + row_width)` intersects the
/// inclusive query range `[start, end]`.
#[inline]
fn row_intersects(row_time: Timestamp, row_width: i64, start: Timestamp, end: Timestamp) -> bool {
    row_time <= end && row_time.saturating_add(row_width) > start
}

/// Resolves the candidate row keys for a query and groups them by row start
/// time. Multiple tag combinations can share a bucket; grouping keeps them
/// together for sequential scanning.
pub fn keys_for_query(
    index: &TagIndex,
    query: &MetricQuery,
    row_width: i64,
) -> Result<BTreeMap<Timestamp, Vec<RowKey>>, EngineError> {
    let candidates = index.resolve(&query.metric, &query.tag_filter)?;
    let mut grouped: BTreeMap<Timestamp, Vec<RowKey>> = BTreeMap::new();
    for key in candidates {
        if row_intersects(key.row_time(), row_width, query.start, query.end) {
            grouped.entry(key.row_time()).or_default().push(key);
        }
    }
    Ok(grouped)
}

/// Clamped `[from, to]` column-offset window of `query` within the row
/// starting at `row_time`.
fn offset_window(
    query: &MetricQuery,
    row_time: Timestamp,
    row_width: i64,
) -> (ColumnTime, ColumnTime) {
    let from = if query.start > row_time {
        query.start - row_time
    } else {
        0
    };
    let to = query.end.min(row_time.saturating_add(row_width - 1)) - row_time;
    (from, to)
}

/// State for the row currently being drained by a [`PointStream`].
#[derive(Debug)]
struct RowCursor {
    key: RowKey,
    to: ColumnTime,
    page: std::vec::IntoIter<Column>,
    last_offset: Option<ColumnTime>,
    /// Set while the last page came back full, i.e. the row may hold more
    /// columns beyond what was fetched.
    may_have_more: bool,
}

/// Lazy, finite, closeable stream of data points. Not restartable.
///
/// Rows are consumed ascending by row start; columns within a row ascending
/// by offset. Row intervals are disjoint by construction, so the merged
/// output is globally time-ordered without an explicit merge step.
///
/// Dropping the stream closes it; [`PointStream::close`] can be called
/// earlier to stop issuing further page reads and release the row cursor.
pub struct PointStream<'a, S: ColumnFamilyStore + ?Sized> {
    store: &'a S,
    events: Arc<dyn EngineEventListener>,
    query: MetricQuery,
    keys: std::vec::IntoIter<RowKey>,
    current: Option<RowCursor>,
    row_width: i64,
    page_size: usize,
    closed: bool,
}

impl<'a, S: ColumnFamilyStore + ?Sized> PointStream<'a, S> {
    pub(crate) fn new(
        store: &'a S,
        events: Arc<dyn EngineEventListener>,
        query: MetricQuery,
        keys: Vec<RowKey>,
        row_width: i64,
        page_size: usize,
    ) -> Self {
        PointStream {
            store,
            events,
            query,
            keys: keys.into_iter(),
            current: None,
            row_width,
            page_size,
            closed: false,
        }
    }

    /// Stops the stream: no further page or row reads will be issued.
    /// In-flight state is discarded. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }

    fn fail(&mut self, error: EngineError) -> Option<Result<DataPoint, EngineError>> {
        self.close();
        Some(Err(error))
    }
}

impl<'a, S: ColumnFamilyStore + ?Sized> Iterator for PointStream<'a, S> {
    type Item = Result<DataPoint, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.closed {
                return None;
            }

            if let Some(cursor) = &mut self.current {
                if let Some(column) = cursor.page.next() {
                    if let Some(last) = cursor.last_offset {
                        if column.offset <= last {
                            let key = cursor.key.clone();
                            return self.fail(out_of_order(&key, last, column.offset));
                        }
                    }
                    cursor.last_offset = Some(column.offset);
                    return Some(Ok(DataPoint {
                        timestamp: cursor.key.row_time() + column.offset,
                        value: column.value,
                    }));
                }

                if cursor.may_have_more {
                    // Full page: the row may extend past what we fetched.
                    // Chain the next read just after the last offset seen.
                    let from = match cursor.last_offset {
                        Some(last) => last + 1,
                        None => 0,
                    };
                    let page = match self
                        .store
                        .read_columns(&cursor.key, from, cursor.to, self.page_size)
                    {
                        Ok(page) => page,
                        Err(e) => return self.fail(e),
                    };
                    if page.len() > self.page_size {
                        let key = cursor.key.clone();
                        let len = page.len();
                        return self.fail(oversized_page(&key, len, self.page_size));
                    }
                    self.events.on_event(EngineEvent::OverflowPageRead {
                        metric: cursor.key.metric().to_string(),
                        row_time: cursor.key.row_time(),
                        page_len: page.len(),
                    });
                    cursor.may_have_more = page.len() == self.page_size;
                    cursor.page = page.into_iter();
                    continue;
                }

                self.current = None;
                continue;
            }

            let key = match self.keys.next() {
                Some(key) => key,
                None => {
                    self.close();
                    return None;
                }
            };
            let (from, to) = offset_window(&self.query, key.row_time(), self.row_width);
            let page = match self.store.read_columns(&key, from, to, self.page_size) {
                Ok(page) => page,
                Err(e) => return self.fail(e),
            };
            if page.len() > self.page_size {
                let len = page.len();
                return self.fail(oversized_page(&key, len, self.page_size));
            }
            self.current = Some(RowCursor {
                may_have_more: page.len() == self.page_size,
                to,
                page: page.into_iter(),
                last_offset: None,
                key,
            });
        }
    }
}

impl<'a, S: ColumnFamilyStore + ?Sized> Drop for PointStream<'a, S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn oversized_page(key: &RowKey, got: usize, limit: usize) -> EngineError {
    EngineError::Integrity {
        details: format!("store returned {} columns for a limit of {}", got, limit),
        row: Some(format!("{}@{}", key.metric(), key.row_time())),
    }
}

fn out_of_order(key: &RowKey, last: ColumnTime, next: ColumnTime) -> EngineError {
    EngineError::Integrity {
        details: format!("column offset {} after {} breaks ordering", next, last),
        row: Some(format!("{}@{}", key.metric(), key.row_time())),
    }
}

/// Fully materializes one row within the query window, stitching overflow
/// pages. Shares the paging protocol with [`PointStream`] checks included.
fn read_row<S: ColumnFamilyStore>(
    store: &S,
    events: &Arc<dyn EngineEventListener>,
    key: &RowKey,
    query: &MetricQuery,
    row_width: i64,
    page_size: usize,
) -> Result<DataPointRow, EngineError> {
    let (mut from, to) = offset_window(query, key.row_time(), row_width);
    let mut points = Vec::new();
    let mut last_offset: Option<ColumnTime> = None;
    let mut first_page = true;

    loop {
        let page = store.read_columns(key, from, to, page_size)?;
        if page.len() > page_size {
            return Err(oversized_page(key, page.len(), page_size));
        }
        if !first_page {
            events.on_event(EngineEvent::OverflowPageRead {
                metric: key.metric().to_string(),
                row_time: key.row_time(),
                page_len: page.len(),
            });
        }
        let full_page = page.len() == page_size;
        for column in page {
            if let Some(last) = last_offset {
                if column.offset <= last {
                    return Err(out_of_order(key, last, column.offset));
                }
            }
            last_offset = Some(column.offset);
            points.push(DataPoint {
                timestamp: key.row_time() + column.offset,
                value: column.value,
            });
        }
        if !full_page {
            break;
        }
        from = match last_offset {
            Some(last) => last + 1,
            None => break,
        };
        first_page = false;
    }

    Ok(DataPointRow {
        key: key.clone(),
        points,
    })
}

/// Materializes every matching row, writes them in row order into the
/// supplied cached-result handle, seals it, and returns the rows.
///
/// Row fetches fan out in parallel (each row's paging stays sequential, since
/// every page depends on the previous one) and results are replayed in row
/// order, not completion order. Rows the index still references but that hold
/// no matching columns are dropped silently.
pub fn query_rows<S: ColumnFamilyStore>(
    store: &S,
    index: &TagIndex,
    events: &Arc<dyn EngineEventListener>,
    query: &MetricQuery,
    row_width: i64,
    page_size: usize,
    cache: &mut dyn CachedSearchResult,
) -> Result<Vec<DataPointRow>, EngineError> {
    let keys: Vec<RowKey> = keys_for_query(index, query, row_width)?
        .into_values()
        .flatten()
        .collect();

    let fetched: Vec<Result<DataPointRow, EngineError>> = keys
        .into_par_iter()
        .map(|key| read_row(store, events, &key, query, row_width, page_size))
        .collect();

    let mut rows = Vec::new();
    for item in fetched {
        let row = item?;
        if row.is_empty() {
            continue;
        }
        cache.add_row(&row)?;
        rows.push(row);
    }
    cache.finish()?;
    Ok(rows)
}
