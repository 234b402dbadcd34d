//! Structured per-item lifecycle logging.

use tracing::{error, info};

use edupipe_models::{Stage, VideoId};

/// Logger carrying the item id and stage through a worker's lifecycle
/// events.
#[derive(Debug, Clone)]
pub struct StageLogger {
    item_id: String,
    stage: Stage,
}

impl StageLogger {
    pub fn new(item_id: &VideoId, stage: Stage) -> Self {
        Self {
            item_id: item_id.to_string(),
            stage,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Stage started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Stage progress: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Stage error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            stage = %self.stage,
            "Stage completed: {}", message
        );
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_carries_context() {
        let logger = StageLogger::new(&VideoId::from("row-9"), Stage::Tag);
        assert_eq!(logger.item_id(), "row-9");
        assert_eq!(logger.stage(), Stage::Tag);
    }
}
