use crate::rowkey::RowKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Timestamp type (milliseconds since epoch, signed).
pub type Timestamp = i64;

/// TagSet type (using a HashMap for flexibility).
pub type TagSet = HashMap<String, String>;

/// A data-point payload with its type discriminator.
///
/// The store keeps the discriminator alongside the value so that long counters
/// survive a round trip without being silently widened to floats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointValue {
    Long(i64),
    Double(f64),
}

impl PointValue {
    /// Returns the value as an `i64`, truncating doubles.
    pub fn as_long(&self) -> i64 {
        match self {
            PointValue::Long(v) => *v,
            PointValue::Double(v) => *v as i64,
        }
    }

    /// Returns the value as an `f64`.
    pub fn as_double(&self) -> f64 {
        match self {
            PointValue::Long(v) => *v as f64,
            PointValue::Double(v) => *v,
        }
    }
}

/// Represents a single time-series data point. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: Timestamp,
    pub value: PointValue,
}

impl DataPoint {
    pub fn new_long(timestamp: Timestamp, value: i64) -> Self {
        DataPoint {
            timestamp,
            value: PointValue::Long(value),
        }
    }

    pub fn new_double(timestamp: Timestamp, value: f64) -> Self {
        DataPoint {
            timestamp,
            value: PointValue::Double(value),
        }
    }
}

/// A named metric with a set of tags and a batch of data points.
///
/// Produced by a caller per write batch and consumed once by [`crate::Engine::put`].
/// Tag order is irrelevant; point order is preserved but need not be sorted, a
/// single set may span multiple row buckets (e.g. a historical backfill).
#[derive(Debug, Clone, PartialEq)]
pub struct DataPointSet {
    pub metric: String,
    pub tags: TagSet,
    pub points: Vec<DataPoint>,
}

impl DataPointSet {
    pub fn new(metric: impl Into<String>) -> Self {
        DataPointSet {
            metric: metric.into(),
            tags: TagSet::new(),
            points: Vec::new(),
        }
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn add_point(&mut self, point: DataPoint) {
        self.points.push(point);
    }

    pub fn add_long(&mut self, timestamp: Timestamp, value: i64) {
        self.points.push(DataPoint::new_long(timestamp, value));
    }

    pub fn add_double(&mut self, timestamp: Timestamp, value: f64) {
        self.points.push(DataPoint::new_double(timestamp, value));
    }
}

/// One materialized physical row: its key plus the points read from it,
/// ascending by timestamp. This is what gets written into a
/// [`crate::cache::CachedSearchResult`] handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointRow {
    pub key: RowKey,
    pub points: Vec<DataPoint>,
}

impl DataPointRow {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
