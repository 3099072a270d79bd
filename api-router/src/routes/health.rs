use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::{scope::Visibility, storage::graph_store::EntityFilters};
use serde_json::json;

use crate::api_state::ApiState;

fn probe_status(result: Result<(), String>) -> (&'static str, Option<String>) {
    match result {
        Ok(()) => ("ok", None),
        Err(reason) => ("fail", Some(reason)),
    }
}

/// Aggregate dependency probe. Always 200: a failing dependency is reported
/// in the body, not as an HTTP error, so callers can distinguish "the health
/// endpoint is down" from "a dependency is down".
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let admin_visibility = Visibility::new("__health__", None, None);

    let meta = probe_status(
        state
            .meta
            .counts_by_status(&admin_visibility)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string()),
    );
    let queue = probe_status(
        state
            .queue
            .get_progress("__health__")
            .await
            .map(|_| ())
            .map_err(|e| e.to_string()),
    );
    let vectors = probe_status(
        state
            .vectors
            .ensure_collection(&state.config.vector_collection)
            .await
            .map_err(|e| e.to_string()),
    );
    let graph = probe_status(
        state
            .graph
            .top_entities(&EntityFilters { entity_type: None, limit: 1 })
            .await
            .map(|_| ())
            .map_err(|e| e.to_string()),
    );

    let checks = [("meta", meta), ("queue", queue), ("vectors", vectors), ("graph", graph)];
    let all_ok = checks.iter().all(|(_, (status, _))| *status == "ok");

    let body = json!({
        "status": if all_ok { "ok" } else { "degraded" },
        "checks": checks
            .iter()
            .map(|(name, (status, reason))| (*name, json!({ "status": status, "reason": reason })))
            .collect::<std::collections::HashMap<_, _>>(),
    });

    (StatusCode::OK, Json(body))
}
