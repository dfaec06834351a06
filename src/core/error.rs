use thiserror::Error;

/// Failure reported by an inference capability (detector or text recognizer).
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Detection failed: {0}")]
    Detection(String),
    #[error("Text recognition failed: {0}")]
    Recognition(String),
    #[error("Frame source failed: {0}")]
    Source(String),
    #[error("Model load failed: {0}")]
    ModelLoad(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("Unknown cargo label in store: {0}")]
    UnknownLabel(String),
    #[error("Event not found: {0}")]
    EventNotFound(i64),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] json5::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Model load failed: {0}")]
    ModelLoadFailed(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Frame source error: {0}")]
    Source(CapabilityError),
    #[error("Sync payload error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("Event stream closed")]
    StreamClosed,
}

pub type DispatchResult<T> = Result<T, DispatchError>;
