//! The video work item flowing through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stage::{Stage, StageStatus};
use crate::tags::{CategoryTag, TopicTag};

/// Store-assigned internal identifier for a video row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One media record. Created by ingest with every stage `pending`;
/// mutated only by the stage that owns the current status column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Internal row id.
    pub id: VideoId,
    /// Immutable natural key from the source platform.
    pub external_id: String,
    /// Creator handle the video was discovered under.
    #[serde(default)]
    pub username: Option<String>,
    /// Platform URL the media is fetched from.
    #[serde(default)]
    pub source_url: Option<String>,
    /// Public object-storage URL once uploaded.
    #[serde(default)]
    pub media_url: Option<String>,

    #[serde(default)]
    pub upload_status: StageStatus,
    #[serde(default)]
    pub transcribe_status: StageStatus,
    #[serde(default)]
    pub tag_status: StageStatus,

    /// Cross-round failure counter. Bumped atomically by the store.
    #[serde(default)]
    pub failure_count: u32,
    /// Structured last error keyed by stage, e.g. `{"tag": "..."}`.
    #[serde(default)]
    pub processing_errors: Option<serde_json::Value>,

    #[serde(default)]
    pub language: Option<String>,
    /// Media duration in seconds, known after transcription.
    #[serde(default)]
    pub duration: Option<u32>,

    #[serde(default)]
    pub transcription_model_used: Option<String>,
    #[serde(default)]
    pub tagging_model_used: Option<String>,
    /// Wall-clock seconds the transcription call took.
    #[serde(default)]
    pub transcription_time: Option<f64>,
    /// Wall-clock seconds the tagging call took.
    #[serde(default)]
    pub tagging_time: Option<f64>,

    #[serde(default)]
    pub categories: Option<Vec<CategoryTag>>,
    #[serde(default)]
    pub topics: Option<Vec<TopicTag>>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transcribed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tagged_at: Option<DateTime<Utc>>,
}

impl VideoRecord {
    /// A fresh record as ingest creates it: everything pending.
    pub fn new(id: impl Into<VideoId>, external_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external_id: external_id.into(),
            username: None,
            source_url: None,
            media_url: None,
            upload_status: StageStatus::Pending,
            transcribe_status: StageStatus::Pending,
            tag_status: StageStatus::Pending,
            failure_count: 0,
            processing_errors: None,
            language: None,
            duration: None,
            transcription_model_used: None,
            tagging_model_used: None,
            transcription_time: None,
            tagging_time: None,
            categories: None,
            topics: None,
            created_at: None,
            uploaded_at: None,
            transcribed_at: None,
            tagged_at: None,
        }
    }

    /// Status of the given stage.
    pub fn stage_status(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Upload => self.upload_status,
            Stage::Transcribe => self.transcribe_status,
            Stage::Tag => self.tag_status,
        }
    }

    pub fn set_stage_status(&mut self, stage: Stage, status: StageStatus) {
        match stage {
            Stage::Upload => self.upload_status = status,
            Stage::Transcribe => self.transcribe_status = status,
            Stage::Tag => self.tag_status = status,
        }
    }

    /// Whether the upstream precondition for `stage` is satisfied.
    pub fn eligible_for(&self, stage: Stage) -> bool {
        if self.stage_status(stage) != StageStatus::Pending {
            return false;
        }
        match stage.upstream() {
            Some(up) => self.stage_status(up) == StageStatus::Done,
            None => true,
        }
    }
}
