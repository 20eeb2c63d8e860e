use crate::rowkey::ColumnTime;
use crate::types::Timestamp;
use std::sync::Arc;

/// Structured, in-process event hook for observability.
///
/// This crate is a library; emitting logs directly (e.g. `println!`) is not
/// acceptable for production. Callers can provide an implementation that
/// forwards these events to `tracing`, `log`, metrics, or custom sinks.
pub trait EngineEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: EngineEvent);
}

/// Structured events emitted by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A write batch finished; `rows` is the number of distinct row keys hit.
    WriteBatchCommitted {
        metric: String,
        points: usize,
        rows: usize,
    },
    /// A write batch completed best-effort but at least one column failed.
    WriteBatchPartialFailure {
        metric: String,
        written: usize,
        error: String,
    },

    /// A follow-up page read was issued because the previous page came back
    /// full (overflow stitching).
    OverflowPageRead {
        metric: String,
        row_time: Timestamp,
        page_len: usize,
    },

    RowDeleted {
        metric: String,
        row_time: Timestamp,
    },
    ColumnsDeleted {
        metric: String,
        row_time: Timestamp,
        from: ColumnTime,
        to: ColumnTime,
    },
    IndexPruned {
        metric: String,
        row_time: Timestamp,
    },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl EngineEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: EngineEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn EngineEventListener> {
    Arc::new(NoopEventListener)
}
