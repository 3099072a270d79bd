use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};

use common::{
    error::AppError,
    storage::{meta_store::MetaStore, store::StorageManager, vector_store::VectorStore},
};
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit};

use crate::worker::IngestionWorker;

/// Lifecycle control for a running [`IngestionWorker`], standing in for the
/// admin surface's `start`/`stop`/`set_concurrency` operations. The admin
/// surface itself (HTML, session auth) is out of scope here; this is the
/// hook it would call.
pub struct WorkerSupervisor {
    worker: Arc<IngestionWorker>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    concurrency: AtomicUsize,
    reserved: Mutex<Vec<OwnedSemaphorePermit>>,
}

impl WorkerSupervisor {
    pub fn new(worker: Arc<IngestionWorker>) -> Self {
        let initial = worker.initial_concurrency();
        let (shutdown, _) = watch::channel(false);
        Self {
            worker,
            shutdown,
            handle: Mutex::new(None),
            concurrency: AtomicUsize::new(initial),
            reserved: Mutex::new(Vec::new()),
        }
    }

    /// Starts the dequeue loop on a background task, if it isn't already running.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let _ = self.shutdown.send(false);
        let worker = Arc::clone(&self.worker);
        let rx = self.shutdown.subscribe();
        *handle = Some(tokio::spawn(worker.run(rx)));
    }

    /// Signals shutdown and waits for in-flight documents to drain.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let mut handle = self.handle.lock().await;
        if let Some(handle) = handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.load(Ordering::SeqCst)
    }

    /// Resizes the worker's in-flight slot count. Increasing releases
    /// previously reserved permits (or mints new ones); decreasing acquires
    /// and holds permits so fewer documents can run concurrently. Acquiring
    /// a permit to shrink blocks until an in-flight document releases one.
    pub async fn set_concurrency(&self, target: usize) -> Result<(), AppError> {
        let target = target.clamp(1, 32);
        let current = self.concurrency.load(Ordering::SeqCst);
        if target == current {
            return Ok(());
        }

        let semaphore = self.worker.semaphore();
        let mut reserved = self.reserved.lock().await;

        if target > current {
            let mut delta = target - current;
            while delta > 0 && reserved.pop().is_some() {
                delta -= 1;
            }
            if delta > 0 {
                semaphore.add_permits(delta);
            }
        } else {
            let delta = current - target;
            for _ in 0..delta {
                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Internal(format!("semaphore closed: {e}")))?;
                reserved.push(permit);
            }
        }

        self.concurrency.store(target, Ordering::SeqCst);
        Ok(())
    }
}

/// Deletes every document, its chunks and its uploaded file for `tenant_id`.
/// Graph entities are left in place: they carry no tenant scoping today and
/// may be shared across a tenant's own documents via `link_chunk_entities`'s
/// MERGE semantics, so blind deletion here would be unsound.
pub async fn reset_tenant(
    tenant_id: &str,
    meta: &dyn MetaStore,
    vectors: &dyn VectorStore,
    storage: &StorageManager,
) -> Result<usize, AppError> {
    let documents = meta.list_documents_admin_by_tenant(tenant_id).await?;
    for document in &documents {
        vectors.delete_by_doc(&document.id).await?;
        meta.delete_document(&document.id).await?;
    }
    storage.delete_prefix(&format!("uploads/{tenant_id}/")).await?;
    Ok(documents.len())
}

/// Deletes every document, across every tenant, and wipes the entire upload
/// root. Used by the global-reset admin hook.
pub async fn reset_all(
    meta: &dyn MetaStore,
    vectors: &dyn VectorStore,
    storage: &StorageManager,
) -> Result<usize, AppError> {
    let documents = meta.list_all_documents_admin().await?;
    for document in &documents {
        vectors.delete_by_doc(&document.id).await?;
        meta.delete_document(&document.id).await?;
    }
    storage.delete_prefix("uploads/").await?;
    Ok(documents.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{
        scope::ScopeKey,
        storage::{
            db::SurrealDbClient,
            meta_store::SurrealMetaStore,
            store::testing::TestStorageManager,
            types::document::Document,
            vector_store::SurrealVectorStore,
        },
    };
    use uuid::Uuid;

    async fn fixtures() -> (SurrealMetaStore, SurrealVectorStore, TestStorageManager) {
        let db = SurrealDbClient::memory("admin_test", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.build_indexes().await.expect("indexes");
        let meta = SurrealMetaStore::new(db.clone());
        let vectors = SurrealVectorStore::new(db);
        let storage = TestStorageManager::new_memory().await.expect("storage");
        (meta, vectors, storage)
    }

    #[tokio::test]
    async fn reset_tenant_deletes_only_that_tenants_documents() {
        let (meta, vectors, storage) = fixtures().await;
        let doc_a = Document::new(
            Uuid::new_v4(),
            ScopeKey::tenant("t1"),
            "a.md".into(),
            "text/markdown".into(),
            "uploads/t1/a/a.md".into(),
        );
        let doc_b = Document::new(
            Uuid::new_v4(),
            ScopeKey::tenant("t2"),
            "b.md".into(),
            "text/markdown".into(),
            "uploads/t2/b/b.md".into(),
        );
        meta.insert_document(doc_a.clone()).await.unwrap();
        meta.insert_document(doc_b.clone()).await.unwrap();
        storage.storage().put(&doc_a.storage_path, bytes::Bytes::from_static(b"a")).await.unwrap();
        storage.storage().put(&doc_b.storage_path, bytes::Bytes::from_static(b"b")).await.unwrap();

        let deleted = reset_tenant("t1", &meta, &vectors, storage.storage()).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(meta.get_document_admin(&doc_a.id).await.unwrap().is_none());
        assert!(meta.get_document_admin(&doc_b.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reset_all_deletes_every_tenant() {
        let (meta, vectors, storage) = fixtures().await;
        meta.insert_document(Document::new(
            Uuid::new_v4(),
            ScopeKey::tenant("t1"),
            "a.md".into(),
            "text/markdown".into(),
            "uploads/t1/a/a.md".into(),
        ))
        .await
        .unwrap();
        meta.insert_document(Document::new(
            Uuid::new_v4(),
            ScopeKey::tenant("t2"),
            "b.md".into(),
            "text/markdown".into(),
            "uploads/t2/b/b.md".into(),
        ))
        .await
        .unwrap();

        let deleted = reset_all(&meta, &vectors, storage.storage()).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(meta.list_all_documents_admin().await.unwrap().is_empty());
    }
}
