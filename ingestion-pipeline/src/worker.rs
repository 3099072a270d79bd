use std::sync::Arc;
use std::time::Duration;

use common::{
    error::AppError,
    llm::{ChatClient, Embedder},
    storage::{
        graph_store::GraphStore,
        meta_store::MetaStore,
        queue::Queue,
        store::StorageManager,
        types::{
            chunk::Chunk,
            document::{Document, DocumentStatus, DocumentUpdate},
            progress::{ProgressEvent, Stage},
        },
        vector_store::VectorStore,
    },
    utils::config::AppConfig,
};
use state_machines::core::GuardError;
use tokio::sync::{watch, Semaphore};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

use crate::{
    chunker::{chunk_document, ChunkDraft},
    entity_extractor::extract_entities,
    extraction,
    llm::Completions,
    state,
};

/// How long a `Queue::blocking_pop` call waits for a job before returning,
/// so the poll loop can re-check the shutdown signal.
const POP_TIMEOUT: Duration = Duration::from_secs(2);
/// TTL attached to every progress snapshot written during processing.
const PROGRESS_TTL: Duration = Duration::from_secs(3600);
/// Maximum attempts (including the first) the worker makes at a single
/// remote call before giving up and failing the stage.
const MAX_STAGE_ATTEMPTS: usize = 4;

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::Internal(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}

fn retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(200)
        .map(jitter)
        .take(MAX_STAGE_ATTEMPTS)
}

/// Drives queued documents through ingestion: read, chunk, embed, extract
/// entities, link the graph and mark indexed. Bounded to `concurrency`
/// documents in flight; stages within one document run strictly in order.
pub struct IngestionWorker {
    meta: Arc<dyn MetaStore>,
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    queue: Arc<dyn Queue>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<ChatClient>,
    storage: StorageManager,
    config: AppConfig,
    semaphore: Arc<Semaphore>,
}

impl IngestionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        meta: Arc<dyn MetaStore>,
        vectors: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        queue: Arc<dyn Queue>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<ChatClient>,
        storage: StorageManager,
        config: AppConfig,
    ) -> Self {
        let concurrency = config.worker_concurrency.clamp(1, 32);
        Self {
            meta,
            vectors,
            graph,
            queue,
            embedder,
            chat,
            storage,
            config,
            semaphore: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Runs the dequeue loop until `shutdown` is set. In-flight documents
    /// are allowed to finish; new jobs stop being claimed once it fires.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let job = tokio::select! {
                job = self.queue.blocking_pop(POP_TIMEOUT) => job,
                _ = shutdown.changed() => break,
            };

            match job {
                Ok(Some(job)) => {
                    let worker = Arc::clone(&self);
                    let permit = Arc::clone(&self.semaphore)
                        .acquire_owned()
                        .await
                        .expect("semaphore never closed");
                    tokio::spawn(async move {
                        let _permit = permit;
                        worker.process(job.doc_id).await;
                    });
                }
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to poll ingestion queue");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn process(&self, doc_id: String) {
        if let Err(err) = self.drive(&doc_id).await {
            tracing::error!(doc_id = %doc_id, error = %err, "document ingestion failed");
        }
    }

    async fn emit(&self, event: ProgressEvent) {
        if let Err(err) = self.queue.set_progress(&event, PROGRESS_TTL).await {
            tracing::warn!(doc_id = %event.doc_id, error = %err, "failed to persist progress snapshot");
        }
        self.queue.publish(event);
    }

    /// `last_progress` is the last value reached by a successful `mark_stage`
    /// call in this document's lifetime, so the terminal `Failed` event keeps
    /// progress monotonic instead of dropping back to 0.
    async fn fail(&self, doc: &Document, err: AppError, last_progress: u8) -> AppError {
        let update = DocumentUpdate {
            status: Some(DocumentStatus::Failed),
            error_message: Some(Some(err.to_string())),
            ..Default::default()
        };
        if let Err(update_err) = self.meta.update_document(&doc.id, update).await {
            tracing::warn!(doc_id = %doc.id, error = %update_err, "failed to persist failure status");
        }
        self.emit(
            ProgressEvent::new(doc.id.clone(), doc.scope_key.clone(), Stage::Failed)
                .with_filename(doc.filename.clone())
                .with_message(err.to_string())
                .with_progress(last_progress),
        )
        .await;
        err
    }

    /// Drives one document fully through the pipeline. Returns `Ok(())` for
    /// both a completed document and one silently dropped (missing or
    /// already terminal); stage failures are reported via the `Failed`
    /// progress event and the document's `error_message`, not the return
    /// value.
    async fn drive(&self, doc_id: &str) -> Result<(), AppError> {
        let Some(doc) = self.meta.get_document_admin(doc_id).await? else {
            tracing::warn!(doc_id = %doc_id, "dequeued job references a missing document");
            return Ok(());
        };
        if doc.status.is_terminal() {
            return Ok(());
        }

        let machine = state::processing();
        let mut last_progress = Stage::Queued.progress();

        self.mark_stage(&doc, Stage::Processing).await?;
        last_progress = Stage::Processing.progress();

        let machine = match machine.read() {
            Ok(m) => m,
            Err((_, guard)) => {
                return Err(self.fail(&doc, map_guard_error("read", &guard), last_progress).await)
            }
        };
        self.mark_stage(&doc, Stage::Reading).await?;
        last_progress = Stage::Reading.progress();
        let extracted = match extraction::extract(&doc.content_type, &self.load_bytes(&doc).await?) {
            Ok(e) => e,
            Err(err) => return Err(self.fail(&doc, err, last_progress).await),
        };

        let machine = match machine.chunk() {
            Ok(m) => m,
            Err((_, guard)) => {
                return Err(self.fail(&doc, map_guard_error("chunk", &guard), last_progress).await)
            }
        };
        self.mark_stage(&doc, Stage::Chunking).await?;
        last_progress = Stage::Chunking.progress();
        let drafts = match chunk_document(
            self.chat.as_ref() as &dyn Completions,
            &extracted.text,
            &extracted.pages,
            self.config.chunker_window_tokens,
            self.config.chunker_overlap_tokens,
        )
        .await
        {
            Ok(drafts) => drafts,
            Err(err) => return Err(self.fail(&doc, err, last_progress).await),
        };
        self.meta
            .update_document(
                &doc.id,
                DocumentUpdate {
                    chunk_count: Some(drafts.len() as u32),
                    ..Default::default()
                },
            )
            .await?;

        let machine = match machine.embed() {
            Ok(m) => m,
            Err((_, guard)) => {
                return Err(self.fail(&doc, map_guard_error("embed", &guard), last_progress).await)
            }
        };
        self.mark_stage(&doc, Stage::Embedding).await?;
        last_progress = Stage::Embedding.progress();
        let chunks = match self.embed_and_store(&doc, &drafts).await {
            Ok(chunks) => chunks,
            Err(err) => return Err(self.fail(&doc, err, last_progress).await),
        };

        let machine = match machine.extract_entities() {
            Ok(m) => m,
            Err((_, guard)) => {
                return Err(self
                    .fail(&doc, map_guard_error("extract_entities", &guard), last_progress)
                    .await)
            }
        };
        self.mark_stage(&doc, Stage::Entities).await?;
        last_progress = Stage::Entities.progress();
        let entity_count = self.extract_all_entities(&chunks).await;
        self.meta
            .update_document(
                &doc.id,
                DocumentUpdate {
                    entity_count: Some(entity_count as u32),
                    ..Default::default()
                },
            )
            .await?;

        let machine = match machine.link_graph() {
            Ok(m) => m,
            Err((_, guard)) => {
                return Err(self
                    .fail(&doc, map_guard_error("link_graph", &guard), last_progress)
                    .await)
            }
        };
        self.mark_stage(&doc, Stage::Neo4j).await?;
        last_progress = Stage::Neo4j.progress();
        // Deliberately not propagated: an unreachable/disabled graph store
        // degrades to "no linking happened", not an ingestion failure.

        let _machine = match machine.finalize() {
            Ok(m) => m,
            Err((_, guard)) => {
                return Err(self.fail(&doc, map_guard_error("finalize", &guard), last_progress).await)
            }
        };
        self.meta
            .update_document(
                &doc.id,
                DocumentUpdate {
                    status: Some(DocumentStatus::Indexed),
                    ..Default::default()
                },
            )
            .await?;
        self.emit(
            ProgressEvent::new(doc.id.clone(), doc.scope_key.clone(), Stage::Indexed)
                .with_filename(doc.filename.clone()),
        )
        .await;

        Ok(())
    }

    async fn mark_stage(&self, doc: &Document, stage: Stage) -> Result<(), AppError> {
        self.meta
            .update_document(
                &doc.id,
                DocumentUpdate {
                    status: Some(DocumentStatus::Processing),
                    stage: Some(DocumentStatus::Processing),
                    progress: Some(stage.progress()),
                    ..Default::default()
                },
            )
            .await?;
        self.emit(
            ProgressEvent::new(doc.id.clone(), doc.scope_key.clone(), stage)
                .with_filename(doc.filename.clone()),
        )
        .await;
        Ok(())
    }

    /// Exposes the concurrency-limiting semaphore to [`crate::admin::WorkerSupervisor`],
    /// which resizes it at runtime in response to the admin `set_concurrency` hook.
    pub(crate) fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.semaphore)
    }

    pub(crate) fn initial_concurrency(&self) -> usize {
        self.config.worker_concurrency.clamp(1, 32)
    }

    async fn load_bytes(&self, doc: &Document) -> Result<Vec<u8>, AppError> {
        Ok(self.storage.get(&doc.storage_path).await?.to_vec())
    }

    async fn embed_and_store(
        &self,
        doc: &Document,
        drafts: &[ChunkDraft],
    ) -> Result<Vec<Chunk>, AppError> {
        self.vectors.ensure_collection(&self.config.vector_collection).await?;

        let chunks: Vec<Chunk> = drafts
            .iter()
            .map(|d| {
                Chunk::new(
                    doc.id.clone(),
                    doc.scope_key.clone(),
                    d.start_char,
                    d.end_char,
                    d.pages.clone(),
                    d.title.clone(),
                    d.section.clone(),
                    d.summary.clone(),
                    d.why_this_chunk.clone(),
                    d.text.clone(),
                )
            })
            .collect();

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let vectors = RetryIf::spawn(
            retry_strategy(),
            || {
                let embedder = Arc::clone(&embedder);
                let texts = texts.clone();
                async move { embedder.embed_batch(&texts).await }
            },
            AppError::is_retryable,
        )
        .await?;

        if vectors.len() != chunks.len() {
            return Err(AppError::Internal(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            self.vectors.insert(chunk, vector).await?;
        }

        Ok(chunks)
    }

    /// Best-effort per chunk: a failed extraction is logged and skipped, it
    /// never fails the document.
    async fn extract_all_entities(&self, chunks: &[Chunk]) -> usize {
        let mut total = 0;
        for chunk in chunks {
            let result = extract_entities(self.chat.as_ref() as &dyn Completions, &chunk.text).await;
            let entities = match result {
                Ok(entities) => entities,
                Err(err) => {
                    tracing::warn!(chunk_id = %chunk.id, error = %err, "entity extraction failed for chunk");
                    continue;
                }
            };
            if entities.is_empty() {
                continue;
            }

            if !self.config.graph_enabled {
                total += entities.len();
                continue;
            }

            match self.graph.link_chunk_entities(&chunk.id, &entities).await {
                Ok(linked) => total += linked,
                Err(err) => {
                    tracing::warn!(chunk_id = %chunk.id, error = %err, "failed to link entities into graph store");
                }
            }
        }
        total
    }
}
