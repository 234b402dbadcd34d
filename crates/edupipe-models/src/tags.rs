//! Classification output models.
//!
//! `TagResult` derives `JsonSchema` so the generated schema can be handed
//! to the LLM's structured-output configuration, keeping the declared
//! response shape and the Rust type in lockstep.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Sentinel label for transcripts too short or vague to classify.
pub const INSUFFICIENT_TRANSCRIPT: &str = "insufficient_transcript";

/// Sentinel label for content with no educational value.
pub const NOT_EDUCATIONAL: &str = "not_educational";

/// A broad subject label with model confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryTag {
    pub tag: String,
    /// Model confidence, clamped into [0, 1] by the normalizer.
    pub confidence: f64,
}

/// A specific concept, event, or entity with model confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicTag {
    pub topic: String,
    /// Model confidence, clamped into [0, 1] by the normalizer.
    pub confidence: f64,
}

/// Structured classification result for one transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TagResult {
    #[serde(default)]
    pub categories: Vec<CategoryTag>,
    #[serde(default)]
    pub topics: Vec<TopicTag>,
}

impl TagResult {
    /// Fixed placeholder for records skipped due to insufficient input.
    pub fn insufficient_transcript() -> Self {
        Self {
            categories: vec![CategoryTag {
                tag: INSUFFICIENT_TRANSCRIPT.to_string(),
                confidence: 1.0,
            }],
            topics: vec![TopicTag {
                topic: INSUFFICIENT_TRANSCRIPT.to_string(),
                confidence: 1.0,
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_collections_default_empty() {
        let result: TagResult = serde_json::from_str("{}").unwrap();
        assert!(result.is_empty());

        let result: TagResult =
            serde_json::from_str(r#"{"categories":[{"tag":"science","confidence":0.9}]}"#).unwrap();
        assert_eq!(result.categories.len(), 1);
        assert!(result.topics.is_empty());
    }

    #[test]
    fn test_insufficient_sentinel_shape() {
        let sentinel = TagResult::insufficient_transcript();
        assert_eq!(sentinel.categories[0].tag, INSUFFICIENT_TRANSCRIPT);
        assert_eq!(sentinel.categories[0].confidence, 1.0);
        assert_eq!(sentinel.topics[0].topic, INSUFFICIENT_TRANSCRIPT);
    }

    #[test]
    fn test_schema_declares_required_fields() {
        let schema = schemars::schema_for!(TagResult);
        let json = serde_json::to_value(&schema).unwrap();
        let props = json["properties"].as_object().unwrap();
        assert!(props.contains_key("categories"));
        assert!(props.contains_key("topics"));
    }
}
