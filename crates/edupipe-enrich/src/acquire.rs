//! HTTP source acquirer.
//!
//! Discovery hits a scrape-feed endpoint that returns a JSON array of
//! items for a creator handle; media download is a plain GET against
//! the item's source URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{EnrichError, EnrichResult};
use crate::traits::{DiscoveredItem, SourceAcquirer};

#[derive(Debug, Clone)]
pub struct AcquirerConfig {
    /// Base URL of the discovery feed. Items for a target live at
    /// `{feed_base_url}/items?handle={target}`.
    pub feed_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
}

impl AcquirerConfig {
    pub fn from_env() -> EnrichResult<Self> {
        let feed_base_url = std::env::var("SOURCE_FEED_URL")
            .map_err(|_| EnrichError::config_error("SOURCE_FEED_URL not set"))?;

        Ok(Self {
            feed_base_url,
            api_token: std::env::var("SOURCE_FEED_TOKEN").ok(),
            request_timeout: Duration::from_secs(120),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    id: String,
    #[serde(rename = "videoUrl")]
    video_url: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

pub struct HttpAcquirer {
    http: Client,
    config: AcquirerConfig,
}

impl HttpAcquirer {
    pub fn new(config: AcquirerConfig) -> EnrichResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("edupipe-enrich/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(EnrichError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> EnrichResult<Self> {
        Self::new(AcquirerConfig::from_env()?)
    }
}

#[async_trait]
impl SourceAcquirer for HttpAcquirer {
    async fn discover(&self, target: &str) -> EnrichResult<Vec<DiscoveredItem>> {
        let url = format!(
            "{}/items?handle={}",
            self.config.feed_base_url,
            urlencoding::encode(target)
        );

        let mut request = self.http.get(&url);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichError::from_http_status(status.as_u16(), body));
        }

        let items: Vec<FeedItem> = response
            .json()
            .await
            .map_err(|e| EnrichError::invalid_response(format!("feed payload: {}", e)))?;

        debug!(target = %target, count = items.len(), "discovery feed fetched");

        Ok(items
            .into_iter()
            .map(|item| DiscoveredItem {
                external_id: item.id,
                source_url: item.video_url,
                username: item.author.or_else(|| Some(target.to_string())),
                title: item.title,
            })
            .collect())
    }

    async fn fetch_media(&self, url: &str) -> EnrichResult<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::from_http_status(status.as_u16(), String::new()));
        }

        let bytes = response.bytes().await.map_err(EnrichError::Network)?;
        if bytes.is_empty() {
            return Err(EnrichError::invalid_response("empty media body"));
        }
        Ok(bytes.to_vec())
    }
}
