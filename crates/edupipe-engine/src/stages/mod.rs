//! Stage handlers.
//!
//! One handler per pipeline stage, behind a factory so every pooled
//! worker gets its own handler and its own collaborator clients. A
//! shared client would serialize every worker behind one connection
//! pool entry and one rate-limit bucket.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use edupipe_models::{Stage, Transcript, VideoRecord};
use edupipe_store::RecordStore;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

pub mod tag;
pub mod transcribe;
pub mod upload;

pub use tag::TagHandler;
pub use transcribe::TranscribeHandler;
pub use upload::UploadHandler;

/// Output of one successful stage attempt.
///
/// `patch` holds the record columns the stage produced; the dispatcher
/// merges in the status transition when writing back.
#[derive(Debug, Default)]
pub struct StageResult {
    pub patch: Map<String, Value>,
    /// Transcript row to insert alongside the record patch.
    pub transcript: Option<Transcript>,
    /// Wall-clock seconds the external work took.
    pub elapsed_secs: f64,
}

impl StageResult {
    pub fn with_patch(patch: Map<String, Value>) -> Self {
        Self {
            patch,
            ..Default::default()
        }
    }
}

/// One pipeline stage's processing logic.
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    /// Process one claimed record. The record is `processing` on entry;
    /// the dispatcher owns the terminal transition.
    async fn process(&self, record: &VideoRecord) -> EngineResult<StageResult>;
}

/// Builds a fresh handler per worker.
#[async_trait]
pub trait StageHandlerFactory: Send + Sync {
    async fn create(&self) -> EngineResult<Box<dyn StageHandler>>;

    fn stage(&self) -> Stage;
}

/// Production factory wiring handlers from environment configuration.
pub struct EnvHandlerFactory {
    stage: Stage,
    config: EngineConfig,
    store: Arc<dyn RecordStore>,
}

impl EnvHandlerFactory {
    pub fn new(stage: Stage, config: EngineConfig, store: Arc<dyn RecordStore>) -> Self {
        Self {
            stage,
            config,
            store,
        }
    }
}

#[async_trait]
impl StageHandlerFactory for EnvHandlerFactory {
    async fn create(&self) -> EngineResult<Box<dyn StageHandler>> {
        match self.stage {
            Stage::Upload => {
                let acquirer = edupipe_enrich::HttpAcquirer::from_env()?;
                let store = edupipe_storage::MediaStore::from_env()?;
                Ok(Box::new(UploadHandler::new(
                    Box::new(acquirer),
                    Arc::new(store),
                )))
            }
            Stage::Transcribe => {
                let transcriber = edupipe_enrich::AssemblyClient::from_env()?;
                Ok(Box::new(TranscribeHandler::new(Box::new(transcriber))))
            }
            Stage::Tag => {
                let classifier = edupipe_enrich::GeminiClient::from_env()?;
                Ok(Box::new(TagHandler::new(
                    Box::new(classifier),
                    Arc::clone(&self.store),
                    self.config.min_transcript_len,
                    self.config.restrict_categories,
                )))
            }
        }
    }

    fn stage(&self) -> Stage {
        self.stage
    }
}

/// Missing-field accessor shared by the handlers.
pub(crate) fn require_field<'a>(
    value: &'a Option<String>,
    field: &str,
    record: &VideoRecord,
) -> EngineResult<&'a str> {
    value.as_deref().ok_or_else(|| {
        EngineError::not_processable(format!("record {} has no {}", record.id, field))
    })
}
