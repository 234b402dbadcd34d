//! PostgREST record store client.
//!
//! Thin REST client over the Supabase/PostgREST surface with:
//! - HTTP client tuning (pooling, timeouts)
//! - Built-in backoff on transient failures
//! - Request counters and latency histograms per operation
//!
//! The client never blocks indefinitely: every request carries the
//! configured timeout, and connectivity loss surfaces as
//! `StoreError::Unavailable` so callers can abort the round instead of
//! silently dropping work.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Total store requests by operation and outcome (ok / error).
pub const REQUESTS_METRIC: &str = "store_requests_total";
/// Retries by operation.
pub const RETRIES_METRIC: &str = "store_retries_total";
/// Per-attempt latency in seconds by operation.
pub const LATENCY_METRIC: &str = "store_latency_seconds";

// =============================================================================
// Configuration
// =============================================================================

/// Record store client configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the Supabase project (without the /rest/v1 suffix).
    pub base_url: String,
    /// Service-role key used for both the apikey and bearer headers.
    pub service_key: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Total attempts per request, counting the first.
    pub max_attempts: u32,
    /// Backoff for the first retry; doubles per attempt.
    pub backoff_floor: Duration,
    /// Backoff cap.
    pub backoff_ceiling: Duration,
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let base_url = std::env::var("SUPABASE_URL")
            .map_err(|_| StoreError::request_failed("SUPABASE_URL not set"))?;
        let service_key = std::env::var("SUPABASE_SERVICE_KEY")
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .map_err(|_| StoreError::request_failed("SUPABASE_SERVICE_KEY not set"))?;

        if base_url.is_empty() || service_key.is_empty() {
            return Err(StoreError::request_failed(
                "SUPABASE_URL and SUPABASE_SERVICE_KEY cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("STORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let max_attempts: u32 = std::env::var("STORE_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);

        let backoff_floor_ms: u64 = std::env::var("STORE_BACKOFF_FLOOR_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        let backoff_ceiling_ms: u64 = std::env::var("STORE_BACKOFF_CEILING_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);

        Ok(Self {
            base_url,
            service_key,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            max_attempts: max_attempts.max(1),
            backoff_floor: Duration::from_millis(backoff_floor_ms),
            backoff_ceiling: Duration::from_millis(backoff_ceiling_ms),
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// PostgREST client for the record store.
#[derive(Clone)]
pub struct PostgrestClient {
    http: Client,
    config: StoreConfig,
    rest_url: String,
}

impl PostgrestClient {
    /// Create a new client.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("edupipe-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StoreError::Network)?;

        let rest_url = format!("{}/rest/v1", config.base_url.trim_end_matches('/'));

        Ok(Self {
            http,
            config,
            rest_url,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env()?)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Run a filtered SELECT, returning typed rows.
    pub async fn select<T: DeserializeOwned>(
        &self,
        operation: &str,
        table: &str,
        query: &[(String, String)],
    ) -> StoreResult<Vec<T>> {
        let url = self.table_url(table);
        let response = self
            .send_with_backoff(operation, || {
                self.http.get(&url).headers(self.auth_headers()).query(query)
            })
            .await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    /// Insert rows. `body` is either one row object or an array of rows.
    pub async fn insert(
        &self,
        operation: &str,
        table: &str,
        body: &serde_json::Value,
    ) -> StoreResult<()> {
        let url = self.table_url(table);
        self.send_with_backoff(operation, || {
            self.http
                .post(&url)
                .headers(self.auth_headers())
                .header("Prefer", "return=minimal")
                .json(body)
        })
        .await?;
        Ok(())
    }

    /// Run a filtered partial UPDATE.
    ///
    /// Sends `Prefer: return=representation` so the affected rows come
    /// back; conditional updates (e.g. the claim step) inspect exactly
    /// which rows made the transition.
    pub async fn update<T: DeserializeOwned>(
        &self,
        operation: &str,
        table: &str,
        query: &[(String, String)],
        patch: &serde_json::Value,
    ) -> StoreResult<Vec<T>> {
        let url = self.table_url(table);
        let response = self
            .send_with_backoff(operation, || {
                self.http
                    .patch(&url)
                    .headers(self.auth_headers())
                    .header("Prefer", "return=representation")
                    .query(query)
                    .json(patch)
            })
            .await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    /// Call a Postgres function through the RPC endpoint.
    ///
    /// Used where the update must be atomic server-side (failure-count
    /// bump) rather than read-then-write from this process.
    pub async fn rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        args: &serde_json::Value,
    ) -> StoreResult<T> {
        let url = format!("{}/rpc/{}", self.rest_url, function);
        let operation = format!("rpc_{}", function);

        let response = self
            .send_with_backoff(&operation, || {
                self.http.post(&url).headers(self.auth_headers()).json(args)
            })
            .await?;
        Ok(response.json::<T>().await?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn auth_headers(&self) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        if let Ok(value) = header::HeaderValue::from_str(&self.config.service_key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) =
            header::HeaderValue::from_str(&format!("Bearer {}", self.config.service_key))
        {
            headers.insert(header::AUTHORIZATION, value);
        }
        headers
    }

    /// Send a request, retrying transient failures with capped backoff.
    ///
    /// Retries network errors, 429 (honoring Retry-After), and 5xx up to
    /// `max_attempts` total sends. Other 4xx responses return immediately.
    /// Every attempt is counted and timed under the `operation` label.
    async fn send_with_backoff<B>(&self, operation: &str, build: B) -> StoreResult<Response>
    where
        B: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 1;
        loop {
            let started = Instant::now();
            let outcome = match build().send().await {
                Ok(response) => self.classify(response).await,
                Err(e) => Err(Self::map_transport(e)),
            };
            histogram!(LATENCY_METRIC, "operation" => operation.to_string())
                .record(started.elapsed().as_secs_f64());

            let error = match outcome {
                Ok(response) => {
                    counter!(
                        REQUESTS_METRIC,
                        "operation" => operation.to_string(),
                        "outcome" => "ok"
                    )
                    .increment(1);
                    debug!(operation = %operation, attempt, "store request ok");
                    return Ok(response);
                }
                Err(e) => e,
            };

            counter!(
                REQUESTS_METRIC,
                "operation" => operation.to_string(),
                "outcome" => "error"
            )
            .increment(1);

            if !error.is_retryable() || attempt >= self.config.max_attempts {
                return Err(error);
            }

            let delay = error
                .retry_after_ms()
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.backoff_delay(attempt));

            warn!(
                operation = %operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "store request failed, retrying: {}",
                error
            );
            counter!(RETRIES_METRIC, "operation" => operation.to_string()).increment(1);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Equal-jitter backoff: half the capped exponential delay is fixed,
    /// the other half is randomized off the clock so concurrent
    /// dispatchers desynchronize without a rand dependency.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let floor = self.config.backoff_floor.as_millis() as u64;
        let ceiling = self.config.backoff_ceiling.as_millis() as u64;

        let exp = floor.saturating_mul(1u64 << (attempt - 1).min(16));
        let capped = exp.min(ceiling).max(1);

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64)
            .unwrap_or(0);
        let half = capped / 2;

        Duration::from_millis(half + nanos % (half + 1))
    }

    /// Convert non-success responses into errors.
    async fn classify(&self, response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(StoreError::RateLimited(retry_after_ms));
        }

        let body = response.text().await.unwrap_or_default();
        Err(StoreError::from_http_status(status.as_u16(), body))
    }

    fn map_transport(e: reqwest::Error) -> StoreError {
        if e.is_connect() || e.is_timeout() {
            StoreError::unavailable(e.to_string())
        } else {
            StoreError::Network(e)
        }
    }
}
