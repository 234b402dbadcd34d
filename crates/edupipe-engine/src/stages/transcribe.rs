//! Transcribe stage: speech-to-text plus segment grouping.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::time::Instant;

use edupipe_enrich::{group_words_into_segments, Transcriber};
use edupipe_models::{Stage, Transcript, VideoRecord};

use crate::error::EngineResult;
use crate::logging::StageLogger;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::stages::{require_field, StageHandler, StageResult};

pub struct TranscribeHandler {
    transcriber: Box<dyn Transcriber>,
    retry: RetryPolicy,
}

impl TranscribeHandler {
    pub fn new(transcriber: Box<dyn Transcriber>) -> Self {
        Self {
            transcriber,
            retry: RetryPolicy::new("transcribe"),
        }
    }
}

#[async_trait]
impl StageHandler for TranscribeHandler {
    fn stage(&self) -> Stage {
        Stage::Transcribe
    }

    async fn process(&self, record: &VideoRecord) -> EngineResult<StageResult> {
        let logger = StageLogger::new(&record.id, Stage::Transcribe);
        let media_url = require_field(&record.media_url, "media_url", record)?;

        logger.log_start("submitting for transcription");
        let started = Instant::now();

        let raw = run_with_retry(&self.retry, || self.transcriber.transcribe(media_url))
            .await
            .map_err(|e| {
                logger.log_error(&format!("transcription gave up: {}", e));
                e
            })?;
        let elapsed = started.elapsed().as_secs_f64();

        let segments = group_words_into_segments(&raw.words);
        logger.log_completion(&format!(
            "{} chars, {} words, {} segments in {:.1}s",
            raw.text.len(),
            raw.words.len(),
            segments.len(),
            elapsed
        ));

        let transcript = Transcript {
            video_id: record.id.clone(),
            transcript: raw.text,
            transcript_segments: segments,
            word_timestamps: raw.words,
        };

        let mut patch = Map::new();
        patch.insert(
            "transcribed_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        patch.insert(
            "transcription_model_used".to_string(),
            Value::String(self.transcriber.engine_id().to_string()),
        );
        patch.insert("transcription_time".to_string(), json!(elapsed));
        if let Some(language) = &raw.language_code {
            patch.insert("language".to_string(), Value::String(language.clone()));
        }
        if let Some(duration) = raw.audio_duration {
            patch.insert("duration".to_string(), json!(duration));
        }

        Ok(StageResult {
            patch,
            transcript: Some(transcript),
            elapsed_secs: elapsed,
        })
    }
}
