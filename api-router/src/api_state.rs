use std::sync::Arc;

use common::{
    error::AppError,
    llm::{embedder::OpenAiEmbedder, Embedder},
    storage::{
        db::SurrealDbClient,
        graph_store::{GraphStore, NullGraphStore, SurrealGraphStore},
        meta_store::{MetaStore, SurrealMetaStore},
        queue::{Queue, SurrealQueue},
        store::StorageManager,
        vector_store::{SurrealVectorStore, VectorStore},
    },
    utils::config::AppConfig,
};
use retrieval_pipeline::{FastEmbedReranker, NullReranker, Reranker};

/// Shared state for every `/v1` handler. All store/model access goes through
/// trait objects so tests can swap in in-memory fakes without standing up
/// SurrealDB or a remote model endpoint.
#[derive(Clone)]
pub struct ApiState {
    pub meta: Arc<dyn MetaStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub graph: Arc<dyn GraphStore>,
    pub queue: Arc<dyn Queue>,
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Arc<dyn Reranker>,
    pub storage: StorageManager,
    pub config: AppConfig,
}

impl ApiState {
    /// Connects to SurrealDB, ensures its indexes exist, and wires every
    /// store/model behind the trait objects handlers depend on. The graph
    /// store and reranker are swapped for no-op stand-ins when their
    /// config toggle is off, rather than threaded through as `Option`.
    pub async fn new(config: &AppConfig, storage: StorageManager) -> Result<Self, AppError> {
        let db = SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?;
        db.build_indexes().await?;

        let graph: Arc<dyn GraphStore> = if config.graph_enabled {
            Arc::new(SurrealGraphStore::new(db.clone()))
        } else {
            Arc::new(NullGraphStore)
        };

        let reranker: Arc<dyn Reranker> = if config.reranker_enabled {
            Arc::new(FastEmbedReranker::new(config, config.reranker_pool_size)?)
        } else {
            Arc::new(NullReranker)
        };

        Ok(Self {
            meta: Arc::new(SurrealMetaStore::new(db.clone())),
            vectors: Arc::new(SurrealVectorStore::new(db.clone())),
            graph,
            queue: Arc::new(SurrealQueue::new(db.clone())),
            embedder: Arc::new(OpenAiEmbedder::new(
                &config.embeddings_base_url,
                &config.openai_api_key,
                &config.embeddings_model,
            )),
            reranker,
            storage,
            config: config.clone(),
        })
    }
}
