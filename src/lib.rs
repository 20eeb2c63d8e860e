#![doc = include_str!("../README.md")]
// Declare modules
pub mod cache;
pub mod delete;
pub mod engine;
pub mod error;
pub mod index;
pub mod query;
pub mod rowkey;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod write;

/// Named, ordered, re-iterable snapshot of resolved rows.
pub use crate::cache::{
    create_named_result, create_temp_result, CachedSearchResult, FileCachedResult,
    MemoryCachedResult,
};
/// Configuration options for the engine.
pub use crate::engine::{Engine, EngineConfig, DEFAULT_PAGE_SIZE};
/// Error type for engine operations.
pub use crate::error::EngineError;
/// A resolved metric + tag filter + time range query.
pub use crate::query::{MetricQuery, PointStream};
/// Composite physical row address and the default bucket width.
pub use crate::rowkey::{RowKey, DEFAULT_ROW_WIDTH_MS};
/// The store seam and its bundled in-memory implementation.
pub use crate::store::{Column, ColumnFamilyStore, MemoryStore};
/// Structured event hook for observability.
pub use crate::telemetry::{EngineEvent, EngineEventListener};
/// Core value types.
pub use crate::types::{DataPoint, DataPointRow, DataPointSet, PointValue, TagSet, Timestamp};
