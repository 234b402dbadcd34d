//! In-memory fakes shared by the engine tests.

use async_trait::async_trait;
use serde_json::Map;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use edupipe_models::{Stage, StageError, StageStatus, Transcript, VideoId, VideoRecord};
use edupipe_store::{NewVideo, RecordStore, StoreError, StoreResult};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::stages::{StageHandler, StageHandlerFactory, StageResult};

/// In-memory record store mirroring the PostgREST repo's semantics.
#[derive(Default)]
pub struct FakeStore {
    pub rows: Mutex<HashMap<VideoId, VideoRecord>>,
    pub transcripts: Mutex<HashMap<VideoId, Transcript>>,
    pub fail_fetch: AtomicBool,
    pub created: AtomicU32,
    /// Every status edge written, in order: (id, from, to).
    pub transitions: Mutex<Vec<(VideoId, StageStatus, StageStatus)>>,
}

impl FakeStore {
    pub fn seed(records: Vec<VideoRecord>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut rows = store.rows.lock().unwrap();
            for record in records {
                rows.insert(record.id.clone(), record);
            }
        }
        Arc::new(store)
    }

    pub fn row(&self, id: &str) -> VideoRecord {
        self.rows
            .lock()
            .unwrap()
            .get(&VideoId::from(id))
            .cloned()
            .unwrap()
    }

    pub fn count_with_status(&self, stage: Stage, status: StageStatus) -> usize {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.stage_status(stage) == status)
            .count()
    }

    /// Status edges written that the lifecycle table does not allow.
    pub fn illegal_transitions(&self) -> Vec<(VideoId, StageStatus, StageStatus)> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, from, to)| !from.can_transition(*to))
            .cloned()
            .collect()
    }

    fn record_transition(&self, id: &VideoId, from: StageStatus, to: StageStatus) {
        self.transitions
            .lock()
            .unwrap()
            .push((id.clone(), from, to));
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn fetch_eligible(&self, stage: Stage, limit: usize) -> StoreResult<Vec<VideoRecord>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("fake outage"));
        }
        let rows = self.rows.lock().unwrap();
        let mut eligible: Vec<VideoRecord> = rows
            .values()
            .filter(|r| r.eligible_for(stage))
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        eligible.truncate(limit);
        Ok(eligible)
    }

    async fn claim(&self, stage: Stage, ids: &[VideoId]) -> StoreResult<Vec<VideoId>> {
        let mut rows = self.rows.lock().unwrap();
        let mut claimed = Vec::new();
        for id in ids {
            if let Some(record) = rows.get_mut(id) {
                if record.stage_status(stage) == StageStatus::Pending {
                    record.set_stage_status(stage, StageStatus::Processing);
                    self.record_transition(id, StageStatus::Pending, StageStatus::Processing);
                    claimed.push(id.clone());
                }
            }
        }
        Ok(claimed)
    }

    async fn mark_done(
        &self,
        stage: Stage,
        id: &VideoId,
        _patch: Map<String, serde_json::Value>,
    ) -> StoreResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let record = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;
        let from = record.stage_status(stage);
        record.set_stage_status(stage, StageStatus::Done);
        record.processing_errors = None;
        self.record_transition(id, from, StageStatus::Done);
        Ok(())
    }

    async fn mark_error(
        &self,
        stage: Stage,
        id: &VideoId,
        error: &StageError,
    ) -> StoreResult<u32> {
        let mut rows = self.rows.lock().unwrap();
        let record = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;
        let from = record.stage_status(stage);
        record.set_stage_status(stage, StageStatus::Error);
        record.failure_count += 1;
        record.processing_errors = Some(error.to_column_value());
        self.record_transition(id, from, StageStatus::Error);
        Ok(record.failure_count)
    }

    async fn requeue(
        &self,
        stage: Stage,
        id: &VideoId,
        reset_failure_count: bool,
    ) -> StoreResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let record = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;
        let from = record.stage_status(stage);
        record.set_stage_status(stage, StageStatus::Pending);
        record.processing_errors = None;
        if reset_failure_count {
            record.failure_count = 0;
        }
        self.record_transition(id, from, StageStatus::Pending);
        Ok(())
    }

    async fn reset_errors(&self, stage: Stage) -> StoreResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let mut reset = 0;
        for record in rows.values_mut() {
            if record.stage_status(stage) == StageStatus::Error {
                record.set_stage_status(stage, StageStatus::Pending);
                record.processing_errors = None;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn insert_transcript(&self, transcript: &Transcript) -> StoreResult<()> {
        self.transcripts
            .lock()
            .unwrap()
            .insert(transcript.video_id.clone(), transcript.clone());
        Ok(())
    }

    async fn get_transcript(&self, video_id: &VideoId) -> StoreResult<Option<Transcript>> {
        Ok(self.transcripts.lock().unwrap().get(video_id).cloned())
    }

    async fn existing_external_ids(&self, ids: &[String]) -> StoreResult<HashSet<String>> {
        let rows = self.rows.lock().unwrap();
        let known: HashSet<&str> = rows.values().map(|r| r.external_id.as_str()).collect();
        Ok(ids
            .iter()
            .filter(|id| known.contains(id.as_str()))
            .cloned()
            .collect())
    }

    async fn create_records(&self, new_rows: &[NewVideo]) -> StoreResult<()> {
        let mut rows = self.rows.lock().unwrap();
        for row in new_rows {
            self.created.fetch_add(1, Ordering::SeqCst);
            let id = VideoId::from(format!("row-{}", row.external_id));
            let mut record = VideoRecord::new(id.clone(), row.external_id.clone());
            record.username = row.username.clone();
            record.source_url = row.source_url.clone();
            rows.insert(id, record);
        }
        Ok(())
    }
}

/// Handler failing a configured set of external ids. Ids in `fail_once`
/// succeed on their second `process` call; ids in `fail_always` never
/// succeed.
pub struct FlakyHandler {
    fail_once: HashSet<String>,
    fail_always: HashSet<String>,
    attempts: Arc<Mutex<HashMap<String, u32>>>,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl StageHandler for FlakyHandler {
    fn stage(&self) -> Stage {
        Stage::Upload
    }

    async fn process(&self, record: &VideoRecord) -> EngineResult<StageResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(record.external_id.clone()).or_insert(0);
            *n += 1;
            *n
        };

        if self.fail_always.contains(&record.external_id)
            || (self.fail_once.contains(&record.external_id) && attempt == 1)
        {
            return Err(EngineError::from(edupipe_enrich::EnrichError::Upstream(
                format!("synthetic failure for {}", record.external_id),
            )));
        }
        Ok(StageResult::with_patch(Map::new()))
    }
}

pub struct FlakyFactory {
    fail_once: HashSet<String>,
    fail_always: HashSet<String>,
    attempts: Arc<Mutex<HashMap<String, u32>>>,
    pub calls: Arc<AtomicU32>,
}

impl FlakyFactory {
    pub fn new(fail_once: &[&str], fail_always: &[&str]) -> Self {
        Self {
            fail_once: fail_once.iter().map(|s| s.to_string()).collect(),
            fail_always: fail_always.iter().map(|s| s.to_string()).collect(),
            attempts: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl StageHandlerFactory for FlakyFactory {
    async fn create(&self) -> EngineResult<Box<dyn StageHandler>> {
        Ok(Box::new(FlakyHandler {
            fail_once: self.fail_once.clone(),
            fail_always: self.fail_always.clone(),
            attempts: Arc::clone(&self.attempts),
            calls: Arc::clone(&self.calls),
        }))
    }

    fn stage(&self) -> Stage {
        Stage::Upload
    }
}

/// N pending records with ids `row-01..` and external ids `ext-01..`.
pub fn seed_pending(n: usize) -> Vec<VideoRecord> {
    (1..=n)
        .map(|i| {
            let mut record = VideoRecord::new(format!("row-{:02}", i), format!("ext-{:02}", i));
            record.source_url = Some(format!("https://src.example/{}.mp4", i));
            record
        })
        .collect()
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        batch_size: 20,
        max_concurrency: 4,
        ..Default::default()
    }
}
