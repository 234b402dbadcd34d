//! Collaborator trait seams.
//!
//! Each external collaborator sits behind a trait so stage handlers can
//! be exercised against fakes, and so every worker can hold its own
//! client instance instead of sharing one across the pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use edupipe_models::{TagResult, WordToken};

use crate::error::EnrichResult;

/// Raw output of the speech engine before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTranscript {
    pub text: String,
    pub words: Vec<WordToken>,
    pub language_code: Option<String>,
    /// Media duration in seconds.
    pub audio_duration: Option<u32>,
}

/// Classification output plus the model that actually produced it
/// (fallback means the model can differ per call).
#[derive(Debug, Clone)]
pub struct TagOutcome {
    pub tags: TagResult,
    pub model: String,
}

/// One item yielded by source discovery. Repeated discovery runs may
/// yield duplicates; ingest de-duplicates on `external_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub external_id: String,
    pub source_url: String,
    pub username: Option<String>,
    pub title: Option<String>,
}

/// Speech-to-text collaborator.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the media at a public URL.
    async fn transcribe(&self, media_url: &str) -> EnrichResult<RawTranscript>;

    /// Identifier recorded on the video row.
    fn engine_id(&self) -> &str;
}

/// LLM classification collaborator.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Extract categories and topics from a transcript.
    async fn classify(&self, transcript: &str) -> EnrichResult<TagOutcome>;
}

/// Source discovery and media download collaborator.
#[async_trait]
pub trait SourceAcquirer: Send + Sync {
    /// Enumerate items for a target (e.g. a creator handle).
    async fn discover(&self, target: &str) -> EnrichResult<Vec<DiscoveredItem>>;

    /// Fetch the raw media bytes for one item.
    async fn fetch_media(&self, url: &str) -> EnrichResult<Vec<u8>>;
}
