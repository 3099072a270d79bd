use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scope::ScopeKey;

/// The finer-grained ingestion stages surfaced to subscribers, distinct from
/// the coarse `DocumentStatus` persisted on the `Document` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Queued,
    Processing,
    Reading,
    Chunking,
    Embedding,
    Entities,
    Neo4j,
    Indexed,
    Failed,
}

impl Stage {
    /// The canonical progress percentage associated with entering this stage.
    pub fn progress(self) -> u8 {
        match self {
            Stage::Queued => 0,
            Stage::Processing => 5,
            Stage::Reading => 10,
            Stage::Chunking => 35,
            Stage::Embedding => 55,
            Stage::Entities => 85,
            Stage::Neo4j => 95,
            Stage::Indexed => 100,
            Stage::Failed => 0,
        }
    }
}

/// A snapshot of a document's ingestion state, published to the broadcast
/// channel and to the per-doc TTL key. `progress` is monotonic
/// non-decreasing within one document's lifetime except for the terminal
/// `Failed` event, which freezes at the last value reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub doc_id: String,
    pub scope_key: ScopeKey,
    pub filename: Option<String>,
    pub stage: Stage,
    pub progress: u8,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(doc_id: impl Into<String>, scope_key: ScopeKey, stage: Stage) -> Self {
        Self {
            doc_id: doc_id.into(),
            scope_key,
            filename: None,
            progress: stage.progress(),
            stage,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress;
        self
    }
}

/// The event type a freshly connected SSE client receives before any
/// `ProgressEvent`.
#[derive(Debug, Clone, Serialize)]
pub struct Connected {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl Default for Connected {
    fn default() -> Self {
        Self { kind: "connected" }
    }
}
