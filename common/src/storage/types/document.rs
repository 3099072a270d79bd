use crate::{scope::ScopeKey, stored_object};

/// Coarse lifecycle bucket persisted on the `Document` row. The finer stages
/// emitted as `ProgressEvent`s during `processing` collapse into this single
/// value here; `Document::stage` and `Document::status` both take these four
/// values, mirroring each other except for the moment between dequeue and
/// the worker's first write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Queued,
    Processing,
    Indexed,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Indexed | Self::Failed)
    }
}

stored_object!(Document, "document", {
    scope_key: ScopeKey,
    filename: String,
    content_type: String,
    storage_path: String,
    status: DocumentStatus,
    stage: DocumentStatus,
    progress: u8,
    error_message: Option<String>,
    chunk_count: u32,
    entity_count: u32
});

impl Document {
    pub fn new(
        doc_id: uuid::Uuid,
        scope_key: ScopeKey,
        filename: String,
        content_type: String,
        storage_path: String,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: doc_id.to_string(),
            created_at: now,
            updated_at: now,
            scope_key,
            filename,
            content_type,
            storage_path,
            status: DocumentStatus::Queued,
            stage: DocumentStatus::Queued,
            progress: 0,
            error_message: None,
            chunk_count: 0,
            entity_count: 0,
        }
    }
}

/// Fields a worker stage may atomically update on a `Document` row. All
/// present fields are written in a single `MetaStore::update_document` call.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub status: Option<DocumentStatus>,
    pub stage: Option<DocumentStatus>,
    pub progress: Option<u8>,
    pub error_message: Option<Option<String>>,
    pub chunk_count: Option<u32>,
    pub entity_count: Option<u32>,
}

/// Sort keys exposed on `GET /v1/documents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSort {
    CreatedAt,
    UpdatedAt,
    Filename,
    Status,
    Stage,
    Progress,
    ChunkCount,
    EntityCount,
}

impl Default for DocumentSort {
    fn default() -> Self {
        Self::CreatedAt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::Desc
    }
}

/// Filters accepted by `MetaStore::list_documents`.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilters {
    pub status: Option<DocumentStatus>,
    pub limit: u32,
    pub offset: u32,
    pub sort: DocumentSort,
    pub order: SortOrder,
}

/// Aggregate counts returned by `GET /v1/documents/counts`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentCounts {
    pub total: u64,
    pub queued: u64,
    pub processing: u64,
    pub indexed: u64,
    pub failed: u64,
}
