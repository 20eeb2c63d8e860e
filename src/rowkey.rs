//! Pure row-key and time-bucketing model. No I/O happens here.
//!
//! Every timestamp belongs to exactly one fixed-width time bucket; the bucket
//! start, together with the metric name and canonicalized tag set, forms the
//! physical row address in the column-family store.

use crate::types::{TagSet, Timestamp};
use serde::{Deserialize, Serialize};

/// Default row width: 3 weeks in milliseconds.
pub const DEFAULT_ROW_WIDTH_MS: i64 = 3 * 7 * 24 * 60 * 60 * 1000;

/// Offset of a column within its row, in milliseconds from the row start.
pub type ColumnTime = i64;

/// Buckets `timestamp` to the start of its row.
///
/// Floor division, so negative (pre-epoch) timestamps bucket downward rather
/// than toward zero. Total function, no error cases.
#[inline]
pub fn row_time(timestamp: Timestamp, row_width: i64) -> Timestamp {
    timestamp.div_euclid(row_width) * row_width
}

/// Offset of `timestamp` within the row starting at `row_start`.
///
/// For a correctly bucketed timestamp the offset is also below the row
/// width, but the width is not part of this signature (offsets are relative
/// to a row start alone), so only the lower bound is checkable here. An
/// offset at or beyond the width equally means the caller bucketed against
/// the wrong row; it surfaces as a column landing in a row whose key says
/// otherwise.
///
/// # Panics
/// Panics if `timestamp < row_start`. A negative offset means the caller
/// bucketed the timestamp against the wrong row, which is a programming
/// error, not a recoverable condition.
#[inline]
pub fn column_time(timestamp: Timestamp, row_start: Timestamp) -> ColumnTime {
    let offset = timestamp - row_start;
    assert!(
        offset >= 0,
        "timestamp {} precedes row start {}",
        timestamp,
        row_start
    );
    offset
}

/// Composite address of a physical row: (metric, canonical tag set, row start).
///
/// Tags are held as sorted (key, value) pairs so that two equivalent `TagSet`s
/// produce the same key. Field order gives the derived `Ord` a
/// (row_time, metric, tags) sort, which is exactly the scan order the query
/// path wants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    row_time: Timestamp,
    metric: String,
    /// Sorted (k, v) pairs for deterministic ordering.
    tags_sorted: Vec<(String, String)>,
}

impl RowKey {
    /// Builds the row key owning the point at `timestamp` for (metric, tags).
    pub fn new(metric: &str, tags: &TagSet, timestamp: Timestamp, row_width: i64) -> Self {
        let mut tags_sorted: Vec<_> = tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        tags_sorted.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        RowKey {
            row_time: row_time(timestamp, row_width),
            metric: metric.to_string(),
            tags_sorted,
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn row_time(&self) -> Timestamp {
        self.row_time
    }

    /// The canonical (sorted) tag pairs of this row.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags_sorted
    }
}
