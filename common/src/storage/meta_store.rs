use async_trait::async_trait;

use crate::{
    error::AppError,
    scope::Visibility,
    storage::{
        db::SurrealDbClient,
        types::{
            document::{Document, DocumentCounts, DocumentFilters, DocumentSort, DocumentUpdate, SortOrder},
            StoredObject,
        },
    },
};

/// Document metadata store. Writes to the mutable status/progress fields
/// must be atomic per document; reads are always filtered by the caller's
/// `Visibility`.
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn insert_document(&self, document: Document) -> Result<(), AppError>;
    async fn get_document(
        &self,
        doc_id: &str,
        visibility: &Visibility,
    ) -> Result<Option<Document>, AppError>;
    /// Unfiltered lookup for internal system callers (the ingestion worker)
    /// that must load a row regardless of any caller's visibility set.
    async fn get_document_admin(&self, doc_id: &str) -> Result<Option<Document>, AppError>;
    async fn list_documents(
        &self,
        visibility: &Visibility,
        filters: &DocumentFilters,
    ) -> Result<Vec<Document>, AppError>;
    async fn counts_by_status(&self, visibility: &Visibility) -> Result<DocumentCounts, AppError>;
    async fn update_document(&self, doc_id: &str, update: DocumentUpdate) -> Result<(), AppError>;
    /// Every document belonging to `tenant_id`, at any scope level,
    /// ignoring the usual workspace/principal visibility filter. Backs the
    /// tenant-reset admin hook.
    async fn list_documents_admin_by_tenant(&self, tenant_id: &str) -> Result<Vec<Document>, AppError>;
    /// Every document in the store, across all tenants. Backs the
    /// global-reset admin hook.
    async fn list_all_documents_admin(&self) -> Result<Vec<Document>, AppError>;
    async fn delete_document(&self, doc_id: &str) -> Result<(), AppError>;
}

pub struct SurrealMetaStore {
    db: SurrealDbClient,
}

impl SurrealMetaStore {
    pub fn new(db: SurrealDbClient) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetaStore for SurrealMetaStore {
    async fn insert_document(&self, document: Document) -> Result<(), AppError> {
        self.db.store_item(document).await?;
        Ok(())
    }

    async fn get_document(
        &self,
        doc_id: &str,
        visibility: &Visibility,
    ) -> Result<Option<Document>, AppError> {
        let document = self.db.get_item::<Document>(doc_id).await?;
        Ok(document.filter(|d| visibility.allows(&d.scope_key)))
    }

    async fn get_document_admin(&self, doc_id: &str) -> Result<Option<Document>, AppError> {
        Ok(self.db.get_item::<Document>(doc_id).await?)
    }

    async fn list_documents(
        &self,
        visibility: &Visibility,
        filters: &DocumentFilters,
    ) -> Result<Vec<Document>, AppError> {
        let mut docs: Vec<Document> = self
            .db
            .client
            .query("SELECT * FROM document WHERE scope_key.tenant_id = $tenant_id")
            .bind(("tenant_id", visibility.tenant_id.clone()))
            .await?
            .take(0)?;

        docs.retain(|d| visibility.allows(&d.scope_key));
        if let Some(status) = filters.status {
            docs.retain(|d| d.status == status);
        }

        docs.sort_by(|a, b| {
            let ordering = match filters.sort {
                DocumentSort::CreatedAt => a.created_at.cmp(&b.created_at),
                DocumentSort::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                DocumentSort::Filename => a.filename.cmp(&b.filename),
                DocumentSort::Status => format!("{:?}", a.status).cmp(&format!("{:?}", b.status)),
                DocumentSort::Stage => format!("{:?}", a.stage).cmp(&format!("{:?}", b.stage)),
                DocumentSort::Progress => a.progress.cmp(&b.progress),
                DocumentSort::ChunkCount => a.chunk_count.cmp(&b.chunk_count),
                DocumentSort::EntityCount => a.entity_count.cmp(&b.entity_count),
            };
            match filters.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let start = filters.offset as usize;
        let end = start.saturating_add(filters.limit as usize);
        Ok(docs.into_iter().skip(start).take(end.saturating_sub(start)).collect())
    }

    async fn counts_by_status(&self, visibility: &Visibility) -> Result<DocumentCounts, AppError> {
        let filters = DocumentFilters {
            limit: u32::MAX,
            ..Default::default()
        };
        let docs = self.list_documents(visibility, &filters).await?;

        let mut counts = DocumentCounts::default();
        for doc in &docs {
            counts.total += 1;
            use crate::storage::types::document::DocumentStatus::*;
            match doc.status {
                Queued => counts.queued += 1,
                Processing => counts.processing += 1,
                Indexed => counts.indexed += 1,
                Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn update_document(&self, doc_id: &str, update: DocumentUpdate) -> Result<(), AppError> {
        let Some(mut document) = self.db.get_item::<Document>(doc_id).await? else {
            return Err(AppError::NotFound(format!("document {doc_id}")));
        };

        if let Some(status) = update.status {
            document.status = status;
        }
        if let Some(stage) = update.stage {
            document.stage = stage;
        }
        if let Some(progress) = update.progress {
            document.progress = progress;
        }
        if let Some(error_message) = update.error_message {
            document.error_message = error_message;
        }
        if let Some(chunk_count) = update.chunk_count {
            document.chunk_count = chunk_count;
        }
        if let Some(entity_count) = update.entity_count {
            document.entity_count = entity_count;
        }
        document.updated_at = chrono::Utc::now();

        let _: Option<Document> = self
            .db
            .client
            .update((Document::table_name(), doc_id))
            .content(document)
            .await?;

        Ok(())
    }

    async fn list_documents_admin_by_tenant(&self, tenant_id: &str) -> Result<Vec<Document>, AppError> {
        let docs: Vec<Document> = self
            .db
            .client
            .query("SELECT * FROM document WHERE scope_key.tenant_id = $tenant_id")
            .bind(("tenant_id", tenant_id.to_string()))
            .await?
            .take(0)?;
        Ok(docs)
    }

    async fn list_all_documents_admin(&self) -> Result<Vec<Document>, AppError> {
        Ok(self.db.get_all_stored_items::<Document>().await?)
    }

    async fn delete_document(&self, doc_id: &str) -> Result<(), AppError> {
        let _: Option<Document> = self
            .db
            .client
            .delete((Document::table_name(), doc_id))
            .await?;
        Ok(())
    }
}
