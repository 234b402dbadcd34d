//! Continuous runner.
//!
//! Repeats dispatch rounds until the runtime budget is spent or a
//! shutdown is signalled. The budget is checked between rounds, so an
//! in-flight round always finishes; the overrun is bounded by one
//! round.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::EngineResult;
use crate::retry::FailureStreak;

/// Totals across a whole run. Logged at the end; never used for
/// control flow.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub rounds: u64,
    pub idle_rounds: u64,
    pub items_succeeded: u64,
    pub items_failed: u64,
    pub round_errors: u64,
}

/// Drives a dispatcher in a supervised loop.
pub struct ContinuousRunner {
    config: EngineConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown: watch::Sender<bool>,
    runner_name: String,
}

impl ContinuousRunner {
    pub fn new(config: EngineConfig, dispatcher: Dispatcher) -> Self {
        let (shutdown, _) = watch::channel(false);
        let runner_name = format!("engine-{}", Uuid::new_v4());
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            shutdown,
            runner_name,
        }
    }

    /// Signal the loop to stop after the current round.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Run rounds until the budget or a shutdown signal stops the loop.
    pub async fn run(&self) -> EngineResult<RunSummary> {
        let stage = self.dispatcher.stage();
        info!(
            stage = %stage,
            runner = %self.runner_name,
            run_once = self.config.run_once,
            max_runtime_secs = self.config.max_runtime.as_secs(),
            "runner starting"
        );

        let started = Instant::now();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut summary = RunSummary::default();
        let mut streak = FailureStreak::new(3);

        loop {
            if *shutdown_rx.borrow() {
                info!(stage = %stage, "shutdown signalled, stopping runner");
                break;
            }
            if summary.rounds > 0 && started.elapsed() >= self.config.max_runtime {
                info!(stage = %stage, "runtime budget exhausted, stopping runner");
                break;
            }

            let sleep = match self.dispatcher.run_round().await {
                Ok(report) => {
                    streak.record_success();
                    summary.rounds += 1;
                    summary.items_succeeded += report.succeeded as u64;
                    summary.items_failed += report.failed as u64;
                    if report.is_idle() {
                        summary.idle_rounds += 1;
                        self.config.idle_sleep
                    } else {
                        self.config.inter_batch_sleep
                    }
                }
                Err(e) => {
                    summary.rounds += 1;
                    summary.round_errors += 1;
                    if streak.record_failure() {
                        error!(stage = %stage, "round failed: {}", e);
                    }
                    self.config.idle_sleep
                }
            };

            if self.config.run_once {
                break;
            }

            // Sleep is interruptible so shutdown does not wait out an
            // idle period.
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = shutdown_rx.changed() => {}
            }
        }

        info!(
            stage = %stage,
            rounds = summary.rounds,
            idle_rounds = summary.idle_rounds,
            items_succeeded = summary.items_succeeded,
            items_failed = summary.items_failed,
            round_errors = summary.round_errors,
            elapsed_secs = started.elapsed().as_secs(),
            "runner finished"
        );
        Ok(summary)
    }
}
