//! Batch dispatcher.
//!
//! One round: fetch eligible records, atomically claim them, fan the
//! claimed set out to a semaphore-bounded worker pool, write successes
//! back as `done`, then run the in-round retry pass over the failures.
//! Every claimed record leaves the round in a terminal state; nothing
//! stays `processing`.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use edupipe_models::{Stage, StageError, VideoId, VideoRecord};
use edupipe_store::RecordStore;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::stages::{StageHandler, StageHandlerFactory, StageResult};

/// Ids reported verbatim in a round report before truncation.
const REPORT_ID_CAP: usize = 20;

/// Outcome of one dispatch round.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub stage: Stage,
    pub fetched: usize,
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Ids that ended the round in `error`, capped at a fixed length.
    pub failed_ids: Vec<VideoId>,
}

impl RoundReport {
    fn idle(stage: Stage) -> Self {
        Self {
            stage,
            fetched: 0,
            claimed: 0,
            succeeded: 0,
            failed: 0,
            failed_ids: Vec::new(),
        }
    }

    /// No eligible work was found.
    pub fn is_idle(&self) -> bool {
        self.fetched == 0
    }
}

/// Per-stage batch dispatcher.
pub struct Dispatcher {
    config: EngineConfig,
    store: Arc<dyn RecordStore>,
    factory: Arc<dyn StageHandlerFactory>,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn RecordStore>,
        factory: Arc<dyn StageHandlerFactory>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            config,
            store,
            factory,
            semaphore,
        }
    }

    pub fn stage(&self) -> Stage {
        self.factory.stage()
    }

    /// Execute one dispatch round.
    ///
    /// Store failures during fetch or claim abort the round with an
    /// error; claimed records are never silently dropped.
    pub async fn run_round(&self) -> EngineResult<RoundReport> {
        let stage = self.stage();
        let started = Instant::now();

        let batch = self
            .store
            .fetch_eligible(stage, self.config.batch_size)
            .await?;
        if batch.is_empty() {
            return Ok(RoundReport::idle(stage));
        }

        let ids: Vec<VideoId> = batch.iter().map(|r| r.id.clone()).collect();
        let claimed_ids = self.store.claim(stage, &ids).await?;
        let claimed: Vec<VideoRecord> = batch
            .into_iter()
            .filter(|r| claimed_ids.contains(&r.id))
            .collect();

        info!(
            stage = %stage,
            fetched = ids.len(),
            claimed = claimed.len(),
            "dispatching round"
        );

        let outcomes = self.run_pool(&claimed).await;

        let mut report = RoundReport::idle(stage);
        report.fetched = ids.len();
        report.claimed = claimed.len();

        // Write back successes; anything that fails lands on the ledger
        // with the other first-pass failures.
        let mut ledger: Vec<(VideoRecord, EngineError)> = Vec::new();
        for (record, outcome) in outcomes {
            match outcome {
                Ok(result) => match self.write_success(stage, &record, result).await {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => ledger.push((record, e)),
                },
                Err(e) => ledger.push((record, e)),
            }
        }

        if !ledger.is_empty() {
            self.retry_pass(stage, ledger, &mut report).await?;
        }

        counter!("engine_rounds_total", "stage" => stage.as_str()).increment(1);
        counter!("engine_items_succeeded_total", "stage" => stage.as_str())
            .increment(report.succeeded as u64);
        counter!("engine_items_failed_total", "stage" => stage.as_str())
            .increment(report.failed as u64);
        histogram!("engine_round_seconds", "stage" => stage.as_str())
            .record(started.elapsed().as_secs_f64());

        info!(
            stage = %stage,
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "round complete"
        );
        Ok(report)
    }

    /// Fan claimed records out to the bounded pool. Each worker builds
    /// its own handler from the factory.
    async fn run_pool(
        &self,
        claimed: &[VideoRecord],
    ) -> Vec<(VideoRecord, EngineResult<StageResult>)> {
        let mut handles = Vec::with_capacity(claimed.len());

        for record in claimed {
            let record = record.clone();
            let factory = Arc::clone(&self.factory);
            let semaphore = Arc::clone(&self.semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => {
                        return (
                            record,
                            Err(EngineError::task_failed("worker pool shut down")),
                        )
                    }
                };
                let outcome = match factory.create().await {
                    Ok(handler) => handler.process(&record).await,
                    Err(e) => Err(e),
                };
                (record, outcome)
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(pair) => outcomes.push(pair),
                Err(e) => {
                    // A panicked worker loses its record pairing; the
                    // record stays processing until an operator reset.
                    warn!("stage worker panicked: {}", e);
                }
            }
        }
        outcomes
    }

    async fn write_success(
        &self,
        stage: Stage,
        record: &VideoRecord,
        result: StageResult,
    ) -> EngineResult<()> {
        if let Some(transcript) = &result.transcript {
            self.store.insert_transcript(transcript).await?;
        }
        self.store.mark_done(stage, &record.id, result.patch).await?;
        Ok(())
    }

    /// The in-round retry pass, strictly after the pooled pass.
    ///
    /// Each failed record is requeued to `pending` (resetting the
    /// failure counter when the policy flag says so), re-claimed, then
    /// given one synchronous re-attempt. The re-claim keeps every write
    /// on a legal lifecycle edge and cedes the record if a concurrent
    /// dispatcher grabbed it while it sat pending. Store errors here
    /// abort the round.
    async fn retry_pass(
        &self,
        stage: Stage,
        ledger: Vec<(VideoRecord, EngineError)>,
        report: &mut RoundReport,
    ) -> EngineResult<()> {
        info!(stage = %stage, count = ledger.len(), "running in-round retry pass");
        let handler = self.factory.create().await?;

        for (record, first_error) in ledger {
            self.store
                .requeue(
                    stage,
                    &record.id,
                    self.config.reset_failure_count_on_requeue,
                )
                .await?;

            let reclaimed = self.store.claim(stage, std::slice::from_ref(&record.id)).await?;
            if !reclaimed.contains(&record.id) {
                info!(
                    stage = %stage,
                    item_id = %record.id,
                    "requeued record claimed elsewhere, ceding retry"
                );
                continue;
            }

            match self.retry_one(stage, handler.as_ref(), &record).await {
                Ok(()) => {
                    info!(stage = %stage, item_id = %record.id, "retry succeeded");
                    report.succeeded += 1;
                }
                Err(second_error) => {
                    let stage_error = StageError {
                        stage,
                        message: format!(
                            "failed twice in one round: {}; retry: {}",
                            first_error, second_error
                        ),
                    };
                    let count = self.store.mark_error(stage, &record.id, &stage_error).await?;
                    warn!(
                        stage = %stage,
                        item_id = %record.id,
                        failure_count = count,
                        "retry failed, record marked error"
                    );
                    report.failed += 1;
                    if report.failed_ids.len() < REPORT_ID_CAP {
                        report.failed_ids.push(record.id.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn retry_one(
        &self,
        stage: Stage,
        handler: &dyn StageHandler,
        record: &VideoRecord,
    ) -> EngineResult<()> {
        let result = handler.process(record).await?;
        self.write_success(stage, record, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use edupipe_models::StageStatus;
    use edupipe_store::StoreError;

    use crate::testutil::{seed_pending, test_config, FakeStore, FlakyFactory};

    #[tokio::test]
    async fn test_round_with_flaky_and_dead_items() {
        // 12 items; ext-03 fails once then recovers, ext-07 never works.
        let store = FakeStore::seed(seed_pending(12));
        let factory = Arc::new(FlakyFactory::new(&["ext-03"], &["ext-07"]));
        let dispatcher = Dispatcher::new(test_config(), store.clone(), factory);

        let report = dispatcher.run_round().await.unwrap();

        assert_eq!(report.claimed, 12);
        assert_eq!(report.succeeded, 11);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_ids, vec![VideoId::from("row-07")]);

        // The flaky item recovered on its in-round retry.
        let recovered = store.row("row-03");
        assert_eq!(recovered.upload_status, StageStatus::Done);
        assert_eq!(recovered.failure_count, 0);

        // The dead item failed twice but counts one round-level failure:
        // the requeue reset ran before the terminal bump.
        let dead = store.row("row-07");
        assert_eq!(dead.upload_status, StageStatus::Error);
        assert_eq!(dead.failure_count, 1);
        assert!(dead.processing_errors.is_some());
    }

    #[tokio::test]
    async fn test_every_status_write_is_a_legal_edge() {
        // Exercise the full retry path: a flaky item that recovers and a
        // dead item that ends the round in error. Every status written
        // along the way, including the post-requeue re-claim, must sit on
        // an edge the lifecycle table allows.
        let store = FakeStore::seed(seed_pending(6));
        let factory = Arc::new(FlakyFactory::new(&["ext-02"], &["ext-05"]));
        let dispatcher = Dispatcher::new(test_config(), store.clone(), factory);

        dispatcher.run_round().await.unwrap();

        assert_eq!(store.illegal_transitions(), vec![]);

        // The retry success went pending -> processing -> done, not
        // straight from pending.
        let edges: Vec<_> = store
            .transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| id == &VideoId::from("row-02"))
            .map(|(_, from, to)| (*from, *to))
            .collect();
        assert_eq!(
            edges,
            vec![
                (StageStatus::Pending, StageStatus::Processing),
                (StageStatus::Processing, StageStatus::Pending),
                (StageStatus::Pending, StageStatus::Processing),
                (StageStatus::Processing, StageStatus::Done),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_record_left_processing() {
        let store = FakeStore::seed(seed_pending(8));
        let factory = Arc::new(FlakyFactory::new(&["ext-02", "ext-05"], &["ext-08"]));
        let dispatcher = Dispatcher::new(test_config(), store.clone(), factory);

        dispatcher.run_round().await.unwrap();

        assert_eq!(
            store.count_with_status(Stage::Upload, StageStatus::Processing),
            0
        );
    }

    #[tokio::test]
    async fn test_only_claimed_rows_are_dispatched() {
        let mut records = seed_pending(4);
        // ext-02 was already grabbed by another dispatcher.
        records[1].set_stage_status(Stage::Upload, StageStatus::Processing);
        let store = FakeStore::seed(records);
        let factory = Arc::new(FlakyFactory::new(&[], &[]));
        let calls = Arc::clone(&factory.calls);
        let dispatcher = Dispatcher::new(test_config(), store.clone(), factory);

        let report = dispatcher.run_round().await.unwrap();

        assert_eq!(report.claimed, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // The raced-away row is untouched.
        assert_eq!(store.row("row-02").upload_status, StageStatus::Processing);
    }

    #[tokio::test]
    async fn test_store_outage_aborts_round() {
        let store = FakeStore::seed(seed_pending(3));
        store.fail_fetch.store(true, Ordering::SeqCst);
        let factory = Arc::new(FlakyFactory::new(&[], &[]));
        let dispatcher = Dispatcher::new(test_config(), store, factory);

        let result = dispatcher.run_round().await;
        assert!(matches!(
            result,
            Err(EngineError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_is_idle() {
        let store = FakeStore::seed(Vec::new());
        let factory = Arc::new(FlakyFactory::new(&[], &[]));
        let dispatcher = Dispatcher::new(test_config(), store, factory);

        let report = dispatcher.run_round().await.unwrap();
        assert!(report.is_idle());
    }

    #[tokio::test]
    async fn test_requeue_reset_flag_off_accumulates_failures() {
        let mut config = test_config();
        config.reset_failure_count_on_requeue = false;

        let mut records = seed_pending(1);
        records[0].failure_count = 2;
        let store = FakeStore::seed(records);
        let factory = Arc::new(FlakyFactory::new(&[], &["ext-01"]));
        let dispatcher = Dispatcher::new(config, store.clone(), factory);

        dispatcher.run_round().await.unwrap();

        // Prior failures are kept and the terminal bump lands on top.
        assert_eq!(store.row("row-01").failure_count, 3);
    }
}
