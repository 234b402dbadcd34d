//! Engine configuration.

use std::time::Duration;

/// Dispatch engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Records fetched and claimed per round.
    pub batch_size: usize,
    /// Maximum concurrent stage workers.
    pub max_concurrency: usize,
    /// Sleep between productive rounds.
    pub inter_batch_sleep: Duration,
    /// Sleep when a round found no eligible work.
    pub idle_sleep: Duration,
    /// Overall runtime budget for the continuous runner. The in-flight
    /// round always finishes before the budget is checked.
    pub max_runtime: Duration,
    /// Run a single round and exit.
    pub run_once: bool,
    /// Transcripts shorter than this bypass classification entirely.
    pub min_transcript_len: usize,
    /// Whether the in-round retry resets the cross-round failure counter
    /// before the second attempt. With the flag on, a record that fails
    /// both attempts ends the round at failure_count = 1, not 2.
    pub reset_failure_count_on_requeue: bool,
    /// Restrict category labels to the onboarding bucket set.
    pub restrict_categories: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrency: 4,
            inter_batch_sleep: Duration::from_secs(5),
            idle_sleep: Duration::from_secs(60),
            max_runtime: Duration::from_secs(8 * 3600),
            run_once: false,
            min_transcript_len: 20,
            reset_failure_count_on_requeue: true,
            restrict_categories: false,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: std::env::var("ENGINE_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            max_concurrency: std::env::var("ENGINE_MAX_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrency),
            inter_batch_sleep: Duration::from_secs(
                std::env::var("ENGINE_INTER_BATCH_SLEEP_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            idle_sleep: Duration::from_secs(
                std::env::var("ENGINE_IDLE_SLEEP_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            max_runtime: Duration::from_secs(
                std::env::var("ENGINE_MAX_RUNTIME_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8 * 3600),
            ),
            run_once: std::env::var("ENGINE_RUN_ONCE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            min_transcript_len: std::env::var("ENGINE_MIN_TRANSCRIPT_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_transcript_len),
            reset_failure_count_on_requeue: std::env::var("ENGINE_RESET_FAILURES_ON_REQUEUE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.reset_failure_count_on_requeue),
            restrict_categories: std::env::var("ENGINE_RESTRICT_CATEGORIES")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.restrict_categories),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_policy() {
        let config = EngineConfig::default();
        assert_eq!(config.min_transcript_len, 20);
        assert!(config.reset_failure_count_on_requeue);
        assert!(!config.run_once);
    }
}
