//! Upload stage: pull media from the source platform into the bucket.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

use edupipe_enrich::SourceAcquirer;
use edupipe_models::{Stage, VideoRecord};
use edupipe_storage::MediaStore;

use crate::error::EngineResult;
use crate::logging::StageLogger;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::stages::{require_field, StageHandler, StageResult};

pub struct UploadHandler {
    acquirer: Box<dyn SourceAcquirer>,
    media: Arc<MediaStore>,
    retry: RetryPolicy,
}

impl UploadHandler {
    pub fn new(acquirer: Box<dyn SourceAcquirer>, media: Arc<MediaStore>) -> Self {
        Self {
            acquirer,
            media,
            retry: RetryPolicy::new("fetch_media"),
        }
    }
}

#[async_trait]
impl StageHandler for UploadHandler {
    fn stage(&self) -> Stage {
        Stage::Upload
    }

    async fn process(&self, record: &VideoRecord) -> EngineResult<StageResult> {
        let logger = StageLogger::new(&record.id, Stage::Upload);
        let source_url = require_field(&record.source_url, "source_url", record)?;

        logger.log_start("fetching media from source");
        let started = Instant::now();

        let bytes = run_with_retry(&self.retry, || self.acquirer.fetch_media(source_url))
            .await
            .map_err(|e| {
                logger.log_error(&format!("media fetch gave up: {}", e));
                e
            })?;
        logger.log_progress(&format!("fetched {} bytes", bytes.len()));

        let key = format!("{}.mp4", record.external_id);
        let media_url = self.media.upload_bytes(bytes, &key, "video/mp4").await?;

        let elapsed = started.elapsed().as_secs_f64();
        logger.log_completion(&format!("stored at {}", media_url));

        let mut patch = Map::new();
        patch.insert("media_url".to_string(), Value::String(media_url));
        patch.insert(
            "uploaded_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        Ok(StageResult {
            patch,
            transcript: None,
            elapsed_secs: elapsed,
        })
    }
}
