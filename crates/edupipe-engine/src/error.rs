//! Engine error types.

use thiserror::Error;

use edupipe_enrich::EnrichError;
use edupipe_storage::StorageError;
use edupipe_store::StoreError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfacing from a stage attempt or the dispatch machinery.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Enrichment error: {0}")]
    Enrich(#[from] EnrichError),

    #[error("Record not processable: {0}")]
    NotProcessable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    pub fn not_processable(msg: impl Into<String>) -> Self {
        Self::NotProcessable(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    /// Whether another attempt against the same input could succeed.
    ///
    /// A record with a missing source URL or a rejected transcript stays
    /// broken no matter how often it is retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Enrich(e) => e.is_transient(),
            Self::Storage(e) => matches!(
                e,
                StorageError::UploadFailed(_) | StorageError::DownloadFailed(_)
            ),
            Self::NotProcessable(_) | Self::ConfigError(_) => false,
            Self::TaskFailed(_) => true,
        }
    }
}
