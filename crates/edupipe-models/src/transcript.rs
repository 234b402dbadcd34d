//! Transcript models: word-level tokens and grouped phrase segments.

use serde::{Deserialize, Serialize};

use crate::video::VideoId;

/// One word with millisecond offsets, as returned by the speech engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub text: String,
    /// Start offset in milliseconds.
    pub start: u64,
    /// End offset in milliseconds.
    pub end: u64,
    /// Engine confidence, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl WordToken {
    pub fn new(text: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            confidence: None,
        }
    }
}

/// A phrase-level segment produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start offset in milliseconds.
    pub start: u64,
    /// End offset in milliseconds.
    pub end: u64,
    pub text: String,
}

/// One row of the transcripts table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub video_id: VideoId,
    /// Full flattened text.
    pub transcript: String,
    pub transcript_segments: Vec<TranscriptSegment>,
    pub word_timestamps: Vec<WordToken>,
}

impl Transcript {
    pub fn new(video_id: VideoId, text: impl Into<String>) -> Self {
        Self {
            video_id,
            transcript: text.into(),
            transcript_segments: Vec::new(),
            word_timestamps: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_token_serde_roundtrip() {
        let token = WordToken::new("hello", 0, 420);
        let json = serde_json::to_string(&token).unwrap();
        // Confidence is omitted entirely when absent.
        assert!(!json.contains("confidence"));
        let back: WordToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_word_token_accepts_engine_payload() {
        let raw = r#"{"text":"world.","start":600,"end":1100,"confidence":0.98}"#;
        let token: WordToken = serde_json::from_str(raw).unwrap();
        assert_eq!(token.text, "world.");
        assert_eq!(token.confidence, Some(0.98));
    }
}
