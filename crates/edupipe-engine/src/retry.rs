//! Bounded retry for external collaborator calls.
//!
//! Wraps transcription and classification calls in exponential backoff
//! with jitter. Only transient failures consume retry budget; terminal
//! failures surface on the first attempt.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

/// Errors that can say whether another attempt is worth making.
pub trait TransientError {
    fn is_transient(&self) -> bool;
}

impl TransientError for crate::error::EngineError {
    fn is_transient(&self) -> bool {
        self.is_transient()
    }
}

impl TransientError for edupipe_enrich::EnrichError {
    fn is_transient(&self) -> bool {
        self.is_transient()
    }
}

/// Retry policy for an external operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay, doubled per attempt.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryPolicy {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Backoff for the given zero-based attempt, with full jitter.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);

        // Full jitter in [0, exp], seeded from the clock; good enough
        // for spreading a handful of workers without a rand dependency.
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64)
            .unwrap_or(0);
        let exp_ms = exp.as_millis() as u64;
        if exp_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(nanos % (exp_ms + 1))
    }
}

/// Run an operation under the policy.
///
/// Terminal errors return immediately; transient errors back off and
/// retry until the attempt budget is spent, then the last cause is
/// returned.
pub async fn run_with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientError + std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = %policy.operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "transient failure, retrying in {:?}: {}",
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if !e.is_transient() {
                    debug!(
                        operation = %policy.operation_name,
                        "terminal failure, not retrying: {}",
                        e
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Suppresses log spam from a continuously repeating operation that is
/// failing every round.
#[derive(Debug, Default)]
pub struct FailureStreak {
    consecutive: u32,
    max_logged: u32,
    suppressed: bool,
}

impl FailureStreak {
    pub fn new(max_logged: u32) -> Self {
        Self {
            consecutive: 0,
            max_logged,
            suppressed: false,
        }
    }

    pub fn record_success(&mut self) {
        if self.consecutive > 0 && self.suppressed {
            debug!("recovered after {} consecutive failures", self.consecutive);
        }
        self.consecutive = 0;
        self.suppressed = false;
    }

    /// Returns true when this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        if self.consecutive <= self.max_logged {
            true
        } else {
            if !self.suppressed {
                self.suppressed = true;
                warn!(
                    "suppressing further failure logs after {} consecutive failures",
                    self.max_logged
                );
            }
            false
        }
    }

    pub fn count(&self) -> u32 {
        self.consecutive
    }
}
