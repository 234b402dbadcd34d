//! AssemblyAI transcription client.
//!
//! Submit-then-poll workflow: jobs are created with one POST and polled
//! at a fixed interval until they complete or error. The poll loop
//! carries an overall budget so a stuck job cannot hold a worker
//! forever.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use edupipe_models::WordToken;

use crate::error::{EnrichError, EnrichResult};
use crate::traits::{RawTranscript, Transcriber};

/// Identifier recorded on rows transcribed by this client.
const ENGINE_ID: &str = "AssemblyAI Nano";

/// Transcription client configuration.
#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    pub api_key: String,
    pub base_url: String,
    /// Speech model requested on submission.
    pub speech_model: String,
    /// Fixed interval between status polls.
    pub poll_interval: Duration,
    /// Overall budget for one job's poll loop.
    pub poll_budget: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl TranscriberConfig {
    /// Create config from environment variables.
    pub fn from_env() -> EnrichResult<Self> {
        let api_key = std::env::var("ASSEMBLYAI_API_KEY")
            .map_err(|_| EnrichError::config_error("ASSEMBLYAI_API_KEY not set"))?;

        let poll_interval_secs: u64 = std::env::var("TRANSCRIBE_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);

        let poll_budget_secs: u64 = std::env::var("TRANSCRIBE_POLL_BUDGET_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(600);

        Ok(Self {
            api_key,
            base_url: std::env::var("ASSEMBLYAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.assemblyai.com".to_string()),
            speech_model: std::env::var("TRANSCRIBE_SPEECH_MODEL")
                .unwrap_or_else(|_| "nano".to_string()),
            poll_interval: Duration::from_secs(poll_interval_secs),
            poll_budget: Duration::from_secs(poll_budget_secs),
            request_timeout: Duration::from_secs(10),
        })
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    speech_model: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    status: JobStatus,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    words: Option<Vec<WordToken>>,
    #[serde(default)]
    language_code: Option<String>,
    #[serde(default)]
    audio_duration: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// AssemblyAI REST client.
pub struct AssemblyClient {
    http: Client,
    config: TranscriberConfig,
}

impl AssemblyClient {
    pub fn new(config: TranscriberConfig) -> EnrichResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("edupipe-enrich/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(EnrichError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> EnrichResult<Self> {
        Self::new(TranscriberConfig::from_env()?)
    }

    /// Submit a transcription job, returning its id.
    async fn submit(&self, audio_url: &str) -> EnrichResult<String> {
        let url = format!("{}/v2/transcript", self.config.base_url);
        let body = SubmitRequest {
            audio_url,
            speech_model: &self.config.speech_model,
        };

        let response = self
            .http
            .post(&url)
            .header("authorization", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EnrichError::from_http_status(status.as_u16(), text));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::invalid_response(format!("submit response: {}", e)))?;

        debug!(job_id = %submitted.id, "transcription job submitted");
        Ok(submitted.id)
    }

    async fn poll_once(&self, job_id: &str) -> EnrichResult<PollResponse> {
        let url = format!("{}/v2/transcript/{}", self.config.base_url, job_id);

        let response = self
            .http
            .get(&url)
            .header("authorization", &self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EnrichError::from_http_status(status.as_u16(), text));
        }

        response
            .json()
            .await
            .map_err(|e| EnrichError::invalid_response(format!("poll response: {}", e)))
    }
}

#[async_trait]
impl Transcriber for AssemblyClient {
    async fn transcribe(&self, media_url: &str) -> EnrichResult<RawTranscript> {
        // Presigned-style URLs sometimes carry a dangling query marker.
        let audio_url = media_url.trim_end_matches('?');
        if audio_url.is_empty() {
            return Err(EnrichError::rejected("empty media URL"));
        }

        let job_id = self.submit(audio_url).await?;
        let started = Instant::now();

        loop {
            let polled = self.poll_once(&job_id).await?;
            match polled.status {
                JobStatus::Completed => {
                    info!(job_id = %job_id, "transcription completed");
                    return Ok(RawTranscript {
                        text: polled.text.unwrap_or_default(),
                        words: polled.words.unwrap_or_default(),
                        language_code: polled.language_code,
                        audio_duration: polled.audio_duration.map(|d| d as u32),
                    });
                }
                JobStatus::Error => {
                    return Err(EnrichError::rejected(format!(
                        "transcription failed: {}",
                        polled.error.unwrap_or_else(|| "unknown error".to_string())
                    )));
                }
                JobStatus::Queued | JobStatus::Processing => {
                    if started.elapsed() > self.config.poll_budget {
                        return Err(EnrichError::timeout(format!(
                            "job {} still {:?} after {:?}",
                            job_id, polled.status, self.config.poll_budget
                        )));
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    fn engine_id(&self) -> &str {
        ENGINE_ID
    }
}
