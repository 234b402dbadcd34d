//! Enrichment collaborators for the video pipeline.
//!
//! Transcription (AssemblyAI-style submit-and-poll), LLM classification
//! with structured output, source discovery and media download, and the
//! pure normalization functions that turn raw collaborator output into
//! stored shapes.

pub mod acquire;
pub mod classify;
pub mod error;
pub mod normalize;
pub mod traits;
pub mod transcribe;

pub use acquire::{AcquirerConfig, HttpAcquirer};
pub use classify::{ClassifierConfig, GeminiClient};
pub use error::{EnrichError, EnrichResult};
pub use normalize::{
    clamp_confidence, group_words_into_segments, normalize_tags, ONBOARDING_BUCKETS,
    SEGMENT_GAP_MS,
};
pub use traits::{Classifier, DiscoveredItem, RawTranscript, SourceAcquirer, TagOutcome, Transcriber};
pub use transcribe::{AssemblyClient, TranscriberConfig};
