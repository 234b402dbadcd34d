//! Tag stage: LLM classification of the stored transcript.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use edupipe_enrich::{normalize_tags, Classifier, ONBOARDING_BUCKETS};
use edupipe_models::{Stage, TagResult, VideoRecord};
use edupipe_store::RecordStore;

use crate::error::{EngineError, EngineResult};
use crate::logging::StageLogger;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::stages::{StageHandler, StageResult};

pub struct TagHandler {
    classifier: Box<dyn Classifier>,
    store: Arc<dyn RecordStore>,
    min_transcript_len: usize,
    allowed: Option<HashSet<String>>,
    retry: RetryPolicy,
}

impl TagHandler {
    pub fn new(
        classifier: Box<dyn Classifier>,
        store: Arc<dyn RecordStore>,
        min_transcript_len: usize,
        restrict_categories: bool,
    ) -> Self {
        let allowed = restrict_categories
            .then(|| ONBOARDING_BUCKETS.iter().map(|s| s.to_string()).collect());

        Self {
            classifier,
            store,
            min_transcript_len,
            allowed,
            retry: RetryPolicy::new("classify"),
        }
    }

    fn tag_patch(tags: &TagResult, model: Option<&str>, elapsed_secs: f64) -> StageResult {
        let mut patch = Map::new();
        patch.insert("categories".to_string(), json!(tags.categories));
        patch.insert("topics".to_string(), json!(tags.topics));
        patch.insert(
            "tagged_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        patch.insert("tagging_time".to_string(), json!(elapsed_secs));
        if let Some(model) = model {
            patch.insert(
                "tagging_model_used".to_string(),
                Value::String(model.to_string()),
            );
        }

        StageResult {
            patch,
            transcript: None,
            elapsed_secs,
        }
    }
}

#[async_trait]
impl StageHandler for TagHandler {
    fn stage(&self) -> Stage {
        Stage::Tag
    }

    async fn process(&self, record: &VideoRecord) -> EngineResult<StageResult> {
        let logger = StageLogger::new(&record.id, Stage::Tag);

        let transcript = self
            .store
            .get_transcript(&record.id)
            .await?
            .ok_or_else(|| {
                EngineError::not_processable(format!("record {} has no transcript row", record.id))
            })?;

        let text = transcript.transcript.trim();
        if text.len() < self.min_transcript_len {
            // Too short to classify. Sentinel result, zero time, and no
            // model call.
            logger.log_completion(&format!(
                "transcript below {} chars, marked insufficient",
                self.min_transcript_len
            ));
            let sentinel = TagResult::insufficient_transcript();
            return Ok(Self::tag_patch(&sentinel, None, 0.0));
        }

        logger.log_start(&format!("classifying {} chars", text.len()));
        let started = Instant::now();

        let outcome = run_with_retry(&self.retry, || self.classifier.classify(text))
            .await
            .map_err(|e| {
                logger.log_error(&format!("classification gave up: {}", e));
                e
            })?;
        let elapsed = started.elapsed().as_secs_f64();

        let tags = normalize_tags(outcome.tags, self.allowed.as_ref());
        logger.log_completion(&format!(
            "{} categories, {} topics via {} in {:.1}s",
            tags.categories.len(),
            tags.topics.len(),
            outcome.model,
            elapsed
        ));

        Ok(Self::tag_patch(&tags, Some(&outcome.model), elapsed))
    }
}
