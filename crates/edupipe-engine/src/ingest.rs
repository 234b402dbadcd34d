//! Ingest: discover new source items and create pending records.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use edupipe_enrich::SourceAcquirer;
use edupipe_store::{NewVideo, RecordStore};

use crate::error::EngineResult;

/// Outcome of one ingest run for a target.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub discovered: usize,
    pub duplicates: usize,
    pub created: usize,
}

pub struct Ingestor {
    acquirer: Box<dyn SourceAcquirer>,
    store: Arc<dyn RecordStore>,
}

impl Ingestor {
    pub fn new(acquirer: Box<dyn SourceAcquirer>, store: Arc<dyn RecordStore>) -> Self {
        Self { acquirer, store }
    }

    /// Discover items for a target and create records for the ones not
    /// seen before. Repeated discovery runs and in-feed duplicates both
    /// collapse on `external_id`.
    pub async fn ingest_target(&self, target: &str) -> EngineResult<IngestReport> {
        let items = self.acquirer.discover(target).await?;
        let mut report = IngestReport {
            discovered: items.len(),
            ..Default::default()
        };
        if items.is_empty() {
            return Ok(report);
        }

        let ids: Vec<String> = items.iter().map(|i| i.external_id.clone()).collect();
        let existing = self.store.existing_external_ids(&ids).await?;

        let mut seen_in_feed = HashSet::new();
        let mut new_rows = Vec::new();
        for item in items {
            if existing.contains(&item.external_id) || !seen_in_feed.insert(item.external_id.clone())
            {
                report.duplicates += 1;
                continue;
            }
            new_rows.push(NewVideo {
                external_id: item.external_id,
                username: item.username,
                source_url: Some(item.source_url),
            });
        }

        report.created = new_rows.len();
        self.store.create_records(&new_rows).await?;

        info!(
            target = %target,
            discovered = report.discovered,
            duplicates = report.duplicates,
            created = report.created,
            "ingest complete"
        );
        Ok(report)
    }
}
