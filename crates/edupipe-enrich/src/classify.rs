//! Gemini classification client.
//!
//! Sends transcripts to the Gemini API with a structured-output schema
//! derived from [`TagResult`], so the declared response shape and the
//! Rust type cannot drift apart. Falls through a list of models when
//! one fails.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use async_trait::async_trait;

use edupipe_models::TagResult;

use crate::error::{EnrichError, EnrichResult};
use crate::traits::{Classifier, TagOutcome};

/// Classification client configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub api_key: String,
    pub base_url: String,
    /// Models to try, in order.
    pub models: Vec<String>,
    pub request_timeout: Duration,
}

impl ClassifierConfig {
    /// Create config from environment variables.
    pub fn from_env() -> EnrichResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| EnrichError::config_error("GEMINI_API_KEY not set"))?;

        let models = std::env::var("TAGGING_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            api_key,
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            models: if models.is_empty() {
                vec![
                    "gemini-2.0-flash-lite".to_string(),
                    "gemini-2.0-flash".to_string(),
                    "gemini-1.5-flash".to_string(),
                ]
            } else {
                models
            },
            request_timeout: Duration::from_secs(60),
        })
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    #[serde(rename = "responseSchema")]
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// Gemini API client.
pub struct GeminiClient {
    http: Client,
    config: ClassifierConfig,
    response_schema: serde_json::Value,
}

impl GeminiClient {
    pub fn new(config: ClassifierConfig) -> EnrichResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("edupipe-enrich/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(EnrichError::Network)?;

        let schema = schemars::schema_for!(TagResult);
        let response_schema = serde_json::to_value(&schema)
            .map_err(|e| EnrichError::invalid_response(format!("schema generation: {}", e)))?;

        Ok(Self {
            http,
            config,
            response_schema,
        })
    }

    pub fn from_env() -> EnrichResult<Self> {
        Self::new(ClassifierConfig::from_env()?)
    }

    /// Build the classification prompt.
    fn build_prompt(&self, transcript: &str) -> String {
        format!(
            r#"You are a world-class educational video analyst.

Extract metadata from this short-form video transcript:

1. **categories**: Broad academic subjects or fields, such as, but not limited to:
   - "science"
   - "physics"
   - "chemistry"
   - "biology"
   - "economics"
   - "history"
   - "philosophy"
   - "technology"

2. **topics**: Specific concepts, events, or entities, such as:
   - "photosynthesis"
   - "supply and demand"
   - "World War II"
   - "Plato's Republic"
   - "Great Depression"

Include a confidence score (0.0-1.0) for each. Return multiple categories/topics if applicable, as many as relevant.

Edge Cases:
- Non-educational (e.g. general blogging, jokes, opinion): Return "categories": [{{"tag": "not_educational", "confidence": X}}], "topics": [{{"topic": "not_educational", "confidence": X}}]
- Too short or vague to tell: Return "categories": [{{"tag": "insufficient_transcript", "confidence": 1.0}}], "topics": [{{"topic": "insufficient_transcript", "confidence": 1.0}}]

Return ONLY a single JSON object and nothing else.

Transcript:
"""
{transcript}
"""
"#
        )
    }

    /// Call the API with one model.
    async fn call_model(&self, model: &str, prompt: &str) -> EnrichResult<TagResult> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.base_url, model, self.config.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: self.response_schema.clone(),
            },
        };

        let response = self.http.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EnrichError::from_http_status(status.as_u16(), text));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::invalid_response(format!("response envelope: {}", e)))?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| EnrichError::invalid_response("no content in response"))?;

        // The model sometimes wraps JSON in a markdown code block.
        let text = text.trim();
        let text = text.strip_prefix("```json").unwrap_or(text);
        let text = text.strip_suffix("```").unwrap_or(text);

        serde_json::from_str(text.trim())
            .map_err(|e| EnrichError::invalid_response(format!("tag payload: {}", e)))
    }
}

#[async_trait]
impl Classifier for GeminiClient {
    async fn classify(&self, transcript: &str) -> EnrichResult<TagOutcome> {
        let prompt = self.build_prompt(transcript);
        let mut last_error = None;

        for model in &self.config.models {
            match self.call_model(model, &prompt).await {
                Ok(tags) => {
                    info!(model = %model, "classification succeeded");
                    return Ok(TagOutcome {
                        tags,
                        model: model.clone(),
                    });
                }
                Err(e) => {
                    warn!(model = %model, "classification failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| EnrichError::invalid_response("no classification models configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_against(server: &MockServer, models: Vec<&str>) -> GeminiClient {
        GeminiClient::new(ClassifierConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
            models: models.into_iter().map(String::from).collect(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn envelope(text: &str) -> serde_json::Value {
        json!({
            "candidates": [
                {"content": {"parts": [{"text": text}]}}
            ]
        })
    }

    #[tokio::test]
    async fn test_classify_parses_structured_output() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                r#"{"categories":[{"tag":"science","confidence":0.92}],"topics":[{"topic":"photosynthesis","confidence":0.88}]}"#,
            )))
            .mount(&server)
            .await;

        let client = client_against(&server, vec!["model-a"]);
        let outcome = client.classify("Plants turn light into sugar.").await.unwrap();

        assert_eq!(outcome.model, "model-a");
        assert_eq!(outcome.tags.categories[0].tag, "science");
        assert_eq!(outcome.tags.topics[0].topic, "photosynthesis");
    }

    #[tokio::test]
    async fn test_classify_strips_markdown_fences() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                "```json\n{\"categories\":[],\"topics\":[]}\n```",
            )))
            .mount(&server)
            .await;

        let client = client_against(&server, vec!["model-a"]);
        let outcome = client.classify("short").await.unwrap();
        assert!(outcome.tags.is_empty());
    }

    #[tokio::test]
    async fn test_classify_falls_back_across_models() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/model-b:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                r#"{"categories":[{"tag":"history","confidence":0.7}],"topics":[]}"#,
            )))
            .mount(&server)
            .await;

        let client = client_against(&server, vec!["model-a", "model-b"]);
        let outcome = client.classify("The treaty ended the war.").await.unwrap();
        assert_eq!(outcome.model, "model-b");
    }

    #[tokio::test]
    async fn test_invalid_json_is_terminal() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope("not json at all")))
            .mount(&server)
            .await;

        let client = client_against(&server, vec!["model-a"]);
        let err = client.classify("anything").await.unwrap_err();

        assert!(matches!(err, EnrichError::InvalidResponse(_)));
        assert!(!err.is_transient());
    }
}
