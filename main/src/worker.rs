use std::sync::Arc;

use common::{
    llm::{embedder::OpenAiEmbedder, ChatClient},
    storage::{
        db::SurrealDbClient,
        graph_store::{GraphStore, NullGraphStore, SurrealGraphStore},
        meta_store::SurrealMetaStore,
        queue::SurrealQueue,
        store::StorageManager,
        vector_store::SurrealVectorStore,
    },
    utils::config::get_config,
};
use ingestion_pipeline::IngestionWorker;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

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

    let storage = StorageManager::new(&config).await?;
    let chat = Arc::new(ChatClient::new(
        &config.llm_base_url,
        &config.openai_api_key,
        &config.llm_model,
    ));

    let worker = Arc::new(IngestionWorker::new(
        Arc::new(SurrealMetaStore::new(db.clone())),
        Arc::new(SurrealVectorStore::new(db.clone())),
        graph,
        Arc::new(SurrealQueue::new(db.clone())),
        Arc::new(OpenAiEmbedder::new(
            &config.embeddings_base_url,
            &config.openai_api_key,
            &config.embeddings_model,
        )),
        chat,
        storage,
        config,
    ));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    info!("Starting worker process");
    worker.run(shutdown_rx).await;

    Ok(())
}
