use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState, health_router};
use axum::Router;
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
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Combined single-process deployment: the HTTP surface and the ingestion
/// worker share one runtime. `server`/`worker` remain as separate binaries
/// for deployments that want to scale each independently.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;
    let storage = StorageManager::new(&config).await?;

    let api_state = ApiState::new(&config, storage.clone()).await?;

    let app = Router::new()
        .nest("/v1", api_routes_v1(&api_state))
        .merge(health_router())
        .with_state(api_state);

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&serve_address).await?;
    info!("Starting server listening on {}", serve_address);

    let worker = build_worker(&config, storage).await?;
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = tokio::spawn(async move {
        info!("Starting worker process");
        worker.run(shutdown_rx).await;
    });

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }

    if let Err(e) = worker_handle.await {
        error!("Worker task panicked: {:?}", e);
    }

    Ok(())
}

async fn build_worker(
    config: &common::utils::config::AppConfig,
    storage: StorageManager,
) -> Result<Arc<IngestionWorker>, Box<dyn std::error::Error>> {
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

    let chat = Arc::new(ChatClient::new(
        &config.llm_base_url,
        &config.openai_api_key,
        &config.llm_model,
    ));

    Ok(Arc::new(IngestionWorker::new(
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
        config.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use common::{storage::store::testing::TestStorageManager, utils::config::AppConfig};
    use std::collections::HashMap;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn smoke_test_config(namespace: &str, database: &str) -> AppConfig {
        AppConfig {
            openai_api_key: "test-key".into(),
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.into(),
            http_port: 0,
            reranker_enabled: false,
            tenants: HashMap::from([("tok-1".to_string(), "tenant-a".to_string())]),
            ..Default::default()
        }
    }

    async fn build_test_app() -> Router {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let config = smoke_test_config(namespace, &database);

        let storage = TestStorageManager::new_memory()
            .await
            .expect("failed to build storage manager")
            .clone_storage();

        let api_state = ApiState::new(&config, storage)
            .await
            .expect("failed to build api state");

        Router::new()
            .nest("/v1", api_routes_v1(&api_state))
            .merge(health_router())
            .with_state(api_state)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn health_endpoint_is_unauthenticated_and_ok() {
        let app = build_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn v1_routes_reject_missing_bearer_token() {
        let app = build_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/whoami")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn whoami_resolves_tenant_from_bearer_token() {
        let app = build_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/whoami")
                    .header(header::AUTHORIZATION, "Bearer tok-1")
                    .header("x-workspace-id", "ws-1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["tenant_id"], "tenant-a");
        assert_eq!(json["workspace_id"], "ws-1");
    }
}
