use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use common::storage::graph_store::EntityFilters;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError, util::clamp_limit};

#[derive(Debug, Deserialize)]
pub struct EntitiesQuery {
    q: Option<String>,
    entity_type: Option<String>,
    limit: Option<u32>,
}

/// Top entities by mention count, optionally narrowed by `entity_type` and a
/// case-insensitive substring match against `q`.
pub async fn list_entities(
    State(state): State<ApiState>,
    Query(query): Query<EntitiesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filters = EntityFilters {
        entity_type: query.entity_type,
        limit: clamp_limit(query.limit, 50, 500) as usize,
    };
    let mut counts = state.graph.top_entities(&filters).await?;

    if let Some(needle) = query.q.as_deref().map(str::to_lowercase) {
        counts.retain(|c| c.entity.name.to_lowercase().contains(&needle));
    }

    Ok(Json(counts))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    limit: Option<u32>,
}

pub async fn entity_chunks(
    State(state): State<ApiState>,
    Path(entity_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(query.limit, 25, 200) as usize;
    let mut chunk_ids = state.graph.chunks_for_entity(&entity_id).await?;
    chunk_ids.truncate(limit);
    Ok(Json(chunk_ids))
}

pub async fn document_entities(
    State(state): State<ApiState>,
    Path(doc_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(query.limit, 50, 500) as usize;
    let mut entities = state.graph.entities_for_document(&doc_id).await?;
    entities.truncate(limit);
    Ok(Json(entities))
}
