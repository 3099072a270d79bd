use axum::{extract::State, response::IntoResponse, Extension, Json};
use common::scope::Visibility;
use retrieval_pipeline::{retrieve, RetrieveRequest as PipelineRequest};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RetrieveBody {
    query: String,
    limit: Option<usize>,
    alpha: Option<f32>,
}

pub async fn retrieve_chunks(
    State(state): State<ApiState>,
    Extension(visibility): Extension<Visibility>,
    Json(body): Json<RetrieveBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.query.trim().is_empty() {
        return Err(ApiError::Validation("query must not be empty".to_string()));
    }
    let limit = body.limit.unwrap_or(10).clamp(1, 50);
    let alpha = body.alpha.unwrap_or(0.5);
    if !(0.0..=1.0).contains(&alpha) {
        return Err(ApiError::Validation("alpha must be within [0, 1]".to_string()));
    }

    let request = PipelineRequest { query: body.query, limit, alpha };

    let result = retrieve(
        &request,
        &visibility,
        state.embedder.as_ref(),
        state.vectors.as_ref(),
        state.graph.as_ref(),
        state.reranker.as_ref(),
        state.config.graph_enabled,
    )
    .await?;

    Ok(Json(result))
}
