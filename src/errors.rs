use thiserror::Error;

/// Error type for triplestore operations.
#[derive(Debug, Error)]
pub enum TripleStoreError {
    #[error("concurrency error: {0}")]
    Concurrency(String),
    #[error("stale transaction: {0}")]
    StaleTransaction(String),
    #[error("read-only violation: {0}")]
    ReadOnlyViolation(String),
    #[error("no active transaction: {0}")]
    NoActiveTransaction(String),
    #[error("dataset closed")]
    DatasetClosed,
    #[error("storage i/o error: {0}")]
    StorageIo(String),
    #[error("invalid triple: {0}")]
    InvalidTriple(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl TripleStoreError {
    pub fn concurrency<T: Into<String>>(msg: T) -> Self {
        TripleStoreError::Concurrency(msg.into())
    }

    pub fn stale<T: Into<String>>(msg: T) -> Self {
        TripleStoreError::StaleTransaction(msg.into())
    }

    pub fn read_only<T: Into<String>>(msg: T) -> Self {
        TripleStoreError::ReadOnlyViolation(msg.into())
    }

    pub fn no_active<T: Into<String>>(msg: T) -> Self {
        TripleStoreError::NoActiveTransaction(msg.into())
    }

    pub fn storage_io<T: Into<String>>(msg: T) -> Self {
        TripleStoreError::StorageIo(msg.into())
    }

    pub fn invalid_triple<T: Into<String>>(msg: T) -> Self {
        TripleStoreError::InvalidTriple(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        TripleStoreError::InvalidInput(msg.into())
    }

    /// Whether re-running the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TripleStoreError::Concurrency(_) | TripleStoreError::StorageIo(_)
        )
    }
}
