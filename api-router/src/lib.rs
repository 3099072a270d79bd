use api_state::ApiState;
use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    documents::{document_counts, get_document, list_documents},
    graph::{document_entities, entity_chunks, list_entities},
    health::health,
    ingest::ingest_document,
    ingestions::{active_ingestions, stream_ingestions},
    retrieve::retrieve_chunks,
    whoami::whoami,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;
mod util;

/// `/v1` API surface. Every route here requires a resolved `Visibility`, so
/// the whole router is wrapped in `api_auth`; mount it under `/v1` and mount
/// [`health_router`] separately, unauthenticated, at the top level.
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/whoami", get(whoami))
        .route("/ingest/document", post(ingest_document))
        .route("/documents/counts", get(document_counts))
        .route("/documents/{doc_id}", get(get_document))
        .route("/documents", get(list_documents))
        .route("/ingestions/active", get(active_ingestions))
        .route("/ingestions/stream", get(stream_ingestions))
        .route("/retrieve", post(retrieve_chunks))
        .route("/graph/entities/{entity_id}/chunks", get(entity_chunks))
        .route("/graph/entities", get(list_entities))
        .route("/graph/documents/{doc_id}/entities", get(document_entities))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth))
}

/// Unauthenticated `/health` endpoint, mounted at the top level rather than
/// under `/v1`.
pub fn health_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new().route("/health", get(health))
}
