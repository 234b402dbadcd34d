//! Pipeline stages and the per-record status state machine.
//!
//! Each video carries one status column per stage. A stage only ever
//! mutates its own column, and the dispatcher enforces the legal
//! transitions defined here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One phase of the pipeline. Every stage owns a status column on the
/// video record plus its own output fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Media acquisition: download the source video and put it in the bucket.
    Upload,
    /// Speech-to-text over the stored media.
    Transcribe,
    /// LLM classification over the transcript.
    Tag,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Transcribe => "transcribe",
            Stage::Tag => "tag",
        }
    }

    /// Name of this stage's status column on the videos table.
    pub fn status_column(&self) -> &'static str {
        match self {
            Stage::Upload => "upload_status",
            Stage::Transcribe => "transcribe_status",
            Stage::Tag => "tag_status",
        }
    }

    /// The stage whose completion gates eligibility for this one.
    pub fn upstream(&self) -> Option<Stage> {
        match self {
            Stage::Upload => None,
            Stage::Transcribe => Some(Stage::Upload),
            Stage::Tag => Some(Stage::Transcribe),
        }
    }

    /// Parse a stage name as used in configuration.
    pub fn parse(s: &str) -> Option<Stage> {
        match s.trim().to_lowercase().as_str() {
            "upload" => Some(Stage::Upload),
            "transcribe" | "transcription" => Some(Stage::Transcribe),
            "tag" | "tagging" => Some(Stage::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-stage record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Eligible for the next dispatch round.
    #[default]
    Pending,
    /// Claimed by a dispatch round. Short-lived; exists only to prevent
    /// double-claiming within or across dispatchers.
    Processing,
    /// Stage output persisted.
    Done,
    /// Both attempts of a round failed. Requires an operator reset.
    Error,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Processing => "processing",
            StageStatus::Done => "done",
            StageStatus::Error => "error",
        }
    }

    /// Terminal states receive no further automatic updates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Done | StageStatus::Error)
    }

    /// Whether moving to `to` is a legal lifecycle transition.
    ///
    /// `Error -> Pending` is the operator-triggered reset; it is never
    /// taken automatically. `Processing -> Pending` is the in-round
    /// requeue before the retry attempt.
    pub fn can_transition(&self, to: StageStatus) -> bool {
        use StageStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Done)
                | (Processing, Error)
                | (Processing, Pending)
                | (Error, Pending)
        )
    }

    pub fn parse(s: &str) -> Option<StageStatus> {
        match s {
            "pending" => Some(StageStatus::Pending),
            "processing" => Some(StageStatus::Processing),
            "done" => Some(StageStatus::Done),
            "error" => Some(StageStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured last-error payload stored on the record.
///
/// Serialized into the `processing_errors` JSON column keyed by stage,
/// matching the shape downstream tooling expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    /// Render as the `{"<stage>": "<message>"}` object stored in the
    /// `processing_errors` column.
    pub fn to_column_value(&self) -> serde_json::Value {
        serde_json::json!({ self.stage.as_str(): self.message })
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lifecycle() {
        use StageStatus::*;

        assert!(Pending.can_transition(Processing));
        assert!(Processing.can_transition(Done));
        assert!(Processing.can_transition(Error));
        assert!(Processing.can_transition(Pending));
        assert!(Error.can_transition(Pending));

        // Never skip the claim step or resurrect a done record.
        assert!(!Pending.can_transition(Done));
        assert!(!Pending.can_transition(Error));
        assert!(!Done.can_transition(Pending));
        assert!(!Done.can_transition(Processing));
        assert!(!Error.can_transition(Processing));
    }

    #[test]
    fn test_terminal_states() {
        assert!(StageStatus::Done.is_terminal());
        assert!(StageStatus::Error.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Processing.is_terminal());
    }

    #[test]
    fn test_stage_upstream_chain() {
        assert_eq!(Stage::Upload.upstream(), None);
        assert_eq!(Stage::Transcribe.upstream(), Some(Stage::Upload));
        assert_eq!(Stage::Tag.upstream(), Some(Stage::Transcribe));
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!(Stage::parse("upload"), Some(Stage::Upload));
        assert_eq!(Stage::parse("Transcription"), Some(Stage::Transcribe));
        assert_eq!(Stage::parse("tagging"), Some(Stage::Tag));
        assert_eq!(Stage::parse("render"), None);
    }

    #[test]
    fn test_stage_error_column_value() {
        let err = StageError::new(Stage::Tag, "model refused");
        assert_eq!(
            err.to_column_value(),
            serde_json::json!({"tag": "model refused"})
        );
    }

    #[test]
    fn test_status_serde_snake_case() {
        let s: StageStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(s, StageStatus::Processing);
        assert_eq!(serde_json::to_string(&StageStatus::Done).unwrap(), "\"done\"");
    }
}
