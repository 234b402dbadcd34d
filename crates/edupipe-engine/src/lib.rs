//! Batch dispatch engine for the video enrichment pipeline.
//!
//! A round fetches eligible records for one stage, claims them
//! atomically, processes them on a bounded worker pool, and writes
//! every claimed record back to a terminal state. The continuous
//! runner repeats rounds under a runtime budget with cooperative
//! shutdown.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod retry;
pub mod runner;
pub mod stages;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::EngineConfig;
pub use dispatcher::{Dispatcher, RoundReport};
pub use error::{EngineError, EngineResult};
pub use ingest::{IngestReport, Ingestor};
pub use logging::StageLogger;
pub use retry::{run_with_retry, FailureStreak, RetryPolicy, TransientError};
pub use runner::{ContinuousRunner, RunSummary};
pub use stages::{
    EnvHandlerFactory, StageHandler, StageHandlerFactory, StageResult, TagHandler,
    TranscribeHandler, UploadHandler,
};
