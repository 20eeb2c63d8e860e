use thiserror::Error;

/// Custom error type for the engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid time range: start={start}, end={end}")]
    InvalidTimeRange { start: i64, end: i64 },

    /// Store I/O failure (timeout, connection loss). Write and delete batches
    /// may have partially applied when this surfaces; retrying is safe because
    /// all engine operations are idempotent upserts/deletes.
    #[error("Store I/O failure: {0}")]
    Store(String),

    /// The store violated the paging protocol (page larger than the requested
    /// limit, or out-of-order column offsets). Fatal: the query path trusts
    /// monotonic ordering from the store.
    #[error("Integrity violation: {details}")]
    Integrity {
        details: String,
        row: Option<String>,
    },

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Cached result error: {0}")]
    Cache(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),
}

// Implement conversion from lock poison errors for convenience
impl<T> From<std::sync::PoisonError<T>> for EngineError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        EngineError::LockError(format!("Mutex/RwLock poisoned: {}", err))
    }
}
