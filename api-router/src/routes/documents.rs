use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use common::{
    scope::Visibility,
    storage::types::document::{Document, DocumentFilters, DocumentSort, DocumentStatus, SortOrder},
};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError, util::clamp_limit};

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    status: Option<DocumentStatus>,
    limit: Option<u32>,
    offset: Option<u32>,
    sort: Option<DocumentSort>,
    order: Option<SortOrder>,
}

pub async fn get_document(
    State(state): State<ApiState>,
    Extension(visibility): Extension<Visibility>,
    Path(doc_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state
        .meta
        .get_document(&doc_id, &visibility)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document {doc_id}")))?;
    Ok(Json(document))
}

pub async fn list_documents(
    State(state): State<ApiState>,
    Extension(visibility): Extension<Visibility>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filters = DocumentFilters {
        status: query.status,
        limit: clamp_limit(query.limit, 100, 500),
        offset: query.offset.unwrap_or(0),
        sort: query.sort.unwrap_or_default(),
        order: query.order.unwrap_or_default(),
    };
    let documents: Vec<Document> = state.meta.list_documents(&visibility, &filters).await?;
    Ok(Json(documents))
}

pub async fn document_counts(
    State(state): State<ApiState>,
    Extension(visibility): Extension<Visibility>,
) -> Result<impl IntoResponse, ApiError> {
    let counts = state.meta.counts_by_status(&visibility).await?;
    Ok(Json(counts))
}
