//! Shared data models for the EduPipe backend.
//!
//! This crate provides Serde-serializable types for:
//! - Per-stage statuses and the legal lifecycle transitions
//! - The video work item flowing through the pipeline
//! - Timestamped transcripts (word tokens and phrase segments)
//! - Classification tags with JSON schema derivation

pub mod stage;
pub mod tags;
pub mod transcript;
pub mod video;

// Re-export common types
pub use stage::{Stage, StageError, StageStatus};
pub use tags::{CategoryTag, TagResult, TopicTag, INSUFFICIENT_TRANSCRIPT, NOT_EDUCATIONAL};
pub use transcript::{Transcript, TranscriptSegment, WordToken};
pub use video::{VideoId, VideoRecord};
