//! Typed repository over the videos and transcripts tables.
//!
//! The claim step and the failure-count bump are both single atomic
//! server-side updates. Read-then-write versions of either lose
//! updates under concurrent dispatchers; the conditional PATCH and the
//! `bump_failure_count` RPC close that race.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use edupipe_models::{Stage, StageError, StageStatus, Transcript, VideoId, VideoRecord};

use crate::client::PostgrestClient;
use crate::error::{StoreError, StoreResult};

const VIDEOS_TABLE: &str = "videos";
const TRANSCRIPTS_TABLE: &str = "transcripts";

/// Bulk IN filters are chunked so a single request never carries an
/// unbounded key list.
const IN_FILTER_CHUNK: usize = 500;

/// A row to be created by ingest. Stage statuses come from the table
/// defaults (all pending).
#[derive(Debug, Clone, Serialize)]
pub struct NewVideo {
    pub external_id: String,
    pub username: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: VideoId,
}

#[derive(Debug, Deserialize)]
struct ExternalIdRow {
    external_id: String,
}

/// The store operations the dispatch engine depends on.
///
/// `VideoRepo` is the production implementation; tests inject an
/// in-memory fake.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch up to `limit` records with this stage pending and its
    /// upstream precondition satisfied.
    async fn fetch_eligible(&self, stage: Stage, limit: usize) -> StoreResult<Vec<VideoRecord>>;

    /// Atomically transition `pending -> processing` for the given ids.
    /// Returns the ids actually claimed; rows raced away by another
    /// dispatcher are simply absent.
    async fn claim(&self, stage: Stage, ids: &[VideoId]) -> StoreResult<Vec<VideoId>>;

    /// Persist stage output and transition to `done`.
    async fn mark_done(
        &self,
        stage: Stage,
        id: &VideoId,
        patch: Map<String, Value>,
    ) -> StoreResult<()>;

    /// Transition to `error`, atomically bump the failure counter, and
    /// store the structured last error. Returns the new counter value.
    async fn mark_error(&self, stage: Stage, id: &VideoId, error: &StageError)
        -> StoreResult<u32>;

    /// Reset a record to `pending` ahead of the in-round retry attempt.
    async fn requeue(
        &self,
        stage: Stage,
        id: &VideoId,
        reset_failure_count: bool,
    ) -> StoreResult<()>;

    /// Operator-triggered `error -> pending` sweep. Returns how many
    /// rows were reset.
    async fn reset_errors(&self, stage: Stage) -> StoreResult<u64>;

    async fn insert_transcript(&self, transcript: &Transcript) -> StoreResult<()>;

    async fn get_transcript(&self, video_id: &VideoId) -> StoreResult<Option<Transcript>>;

    /// Which of the given external ids already have a record.
    async fn existing_external_ids(&self, ids: &[String]) -> StoreResult<HashSet<String>>;

    async fn create_records(&self, rows: &[NewVideo]) -> StoreResult<()>;
}

/// Production repository backed by PostgREST.
#[derive(Clone)]
pub struct VideoRepo {
    client: PostgrestClient,
}

impl VideoRepo {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }

    pub fn from_env() -> StoreResult<Self> {
        Ok(Self::new(PostgrestClient::from_env()?))
    }

    fn in_filter(ids: &[VideoId]) -> String {
        let joined: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        format!("in.({})", joined.join(","))
    }
}

#[async_trait]
impl RecordStore for VideoRepo {
    async fn fetch_eligible(&self, stage: Stage, limit: usize) -> StoreResult<Vec<VideoRecord>> {
        let mut query = vec![
            ("select".to_string(), "*".to_string()),
            (stage.status_column().to_string(), "eq.pending".to_string()),
        ];
        if let Some(upstream) = stage.upstream() {
            query.push((upstream.status_column().to_string(), "eq.done".to_string()));
        }
        query.push(("order".to_string(), "created_at.asc".to_string()));
        query.push(("limit".to_string(), limit.to_string()));

        self.client
            .select("fetch_eligible", VIDEOS_TABLE, &query)
            .await
    }

    async fn claim(&self, stage: Stage, ids: &[VideoId]) -> StoreResult<Vec<VideoId>> {
        let mut claimed = Vec::with_capacity(ids.len());
        let patch = json!({ stage.status_column(): StageStatus::Processing.as_str() });

        for chunk in ids.chunks(IN_FILTER_CHUNK) {
            let query = vec![
                ("select".to_string(), "id".to_string()),
                ("id".to_string(), Self::in_filter(chunk)),
                (stage.status_column().to_string(), "eq.pending".to_string()),
            ];
            let rows: Vec<IdRow> = self.client.update("claim", VIDEOS_TABLE, &query, &patch).await?;
            claimed.extend(rows.into_iter().map(|r| r.id));
        }

        debug!(stage = %stage, requested = ids.len(), claimed = claimed.len(), "claimed batch");
        Ok(claimed)
    }

    async fn mark_done(
        &self,
        stage: Stage,
        id: &VideoId,
        mut patch: Map<String, Value>,
    ) -> StoreResult<()> {
        patch.insert(
            stage.status_column().to_string(),
            Value::String(StageStatus::Done.as_str().to_string()),
        );
        patch.insert("processing_errors".to_string(), Value::Null);

        let query = vec![
            ("select".to_string(), "id".to_string()),
            ("id".to_string(), format!("eq.{}", id)),
        ];
        let rows: Vec<IdRow> = self
            .client
            .update("mark_done", VIDEOS_TABLE, &query, &Value::Object(patch))
            .await?;

        if rows.is_empty() {
            return Err(StoreError::not_found(format!("{}/{}", VIDEOS_TABLE, id)));
        }
        Ok(())
    }

    async fn mark_error(
        &self,
        stage: Stage,
        id: &VideoId,
        error: &StageError,
    ) -> StoreResult<u32> {
        // Server-side atomic increment; returns the new counter.
        let new_count: u32 = self
            .client
            .rpc("bump_failure_count", &json!({ "p_video_id": id.as_str() }))
            .await?;

        let patch = json!({
            stage.status_column(): StageStatus::Error.as_str(),
            "processing_errors": error.to_column_value(),
        });
        let query = vec![
            ("select".to_string(), "id".to_string()),
            ("id".to_string(), format!("eq.{}", id)),
        ];
        let rows: Vec<IdRow> = self
            .client
            .update("mark_error", VIDEOS_TABLE, &query, &patch)
            .await?;

        if rows.is_empty() {
            return Err(StoreError::not_found(format!("{}/{}", VIDEOS_TABLE, id)));
        }
        Ok(new_count)
    }

    async fn requeue(
        &self,
        stage: Stage,
        id: &VideoId,
        reset_failure_count: bool,
    ) -> StoreResult<()> {
        let mut patch = Map::new();
        patch.insert(
            stage.status_column().to_string(),
            Value::String(StageStatus::Pending.as_str().to_string()),
        );
        patch.insert("processing_errors".to_string(), Value::Null);
        if reset_failure_count {
            patch.insert("failure_count".to_string(), json!(0));
        }

        let query = vec![
            ("select".to_string(), "id".to_string()),
            ("id".to_string(), format!("eq.{}", id)),
        ];
        let rows: Vec<IdRow> = self
            .client
            .update("requeue", VIDEOS_TABLE, &query, &Value::Object(patch))
            .await?;

        if rows.is_empty() {
            return Err(StoreError::not_found(format!("{}/{}", VIDEOS_TABLE, id)));
        }
        Ok(())
    }

    async fn reset_errors(&self, stage: Stage) -> StoreResult<u64> {
        let patch = json!({
            stage.status_column(): StageStatus::Pending.as_str(),
            "processing_errors": Value::Null,
        });
        let query = vec![
            ("select".to_string(), "id".to_string()),
            (stage.status_column().to_string(), "eq.error".to_string()),
        ];
        let rows: Vec<IdRow> = self
            .client
            .update("reset_errors", VIDEOS_TABLE, &query, &patch)
            .await?;
        Ok(rows.len() as u64)
    }

    async fn insert_transcript(&self, transcript: &Transcript) -> StoreResult<()> {
        let body = serde_json::to_value(transcript)?;
        self.client
            .insert("insert_transcript", TRANSCRIPTS_TABLE, &body)
            .await
    }

    async fn get_transcript(&self, video_id: &VideoId) -> StoreResult<Option<Transcript>> {
        let query = vec![
            ("select".to_string(), "*".to_string()),
            ("video_id".to_string(), format!("eq.{}", video_id)),
            ("limit".to_string(), "1".to_string()),
        ];
        let mut rows: Vec<Transcript> = self
            .client
            .select("get_transcript", TRANSCRIPTS_TABLE, &query)
            .await?;
        Ok(rows.pop())
    }

    async fn existing_external_ids(&self, ids: &[String]) -> StoreResult<HashSet<String>> {
        let mut existing = HashSet::new();
        for chunk in ids.chunks(IN_FILTER_CHUNK) {
            let query = vec![
                ("select".to_string(), "external_id".to_string()),
                ("external_id".to_string(), format!("in.({})", chunk.join(","))),
            ];
            let rows: Vec<ExternalIdRow> = self
                .client
                .select("existing_external_ids", VIDEOS_TABLE, &query)
                .await?;
            existing.extend(rows.into_iter().map(|r| r.external_id));
        }
        Ok(existing)
    }

    async fn create_records(&self, rows: &[NewVideo]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut body = serde_json::to_value(rows)?;
        // Stamp creation time on every row; statuses use table defaults.
        if let Some(items) = body.as_array_mut() {
            let now = Utc::now().to_rfc3339();
            for item in items {
                if let Some(obj) = item.as_object_mut() {
                    obj.insert("created_at".to_string(), Value::String(now.clone()));
                }
            }
        }
        self.client.insert("create_records", VIDEOS_TABLE, &body).await
    }
}
