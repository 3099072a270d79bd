use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use common::{
    scope::{Scope, Visibility},
    storage::types::{
        document::Document,
        file_info::{sanitize_file_name, upload_location},
        progress::{ProgressEvent, Stage},
    },
};
use serde::Serialize;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, TryFromMultipart)]
pub struct IngestParams {
    pub scope: String,
    #[form_data(limit = "50000000")]
    pub file: FieldData<NamedTempFile>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    doc_id: String,
    status: &'static str,
}

fn parse_scope(raw: &str) -> Result<Scope, ApiError> {
    match raw {
        "tenant" => Ok(Scope::Tenant),
        "workspace" => Ok(Scope::Workspace),
        "user" => Ok(Scope::User),
        other => Err(ApiError::Validation(format!("unrecognized scope: {other}"))),
    }
}

pub async fn ingest_document(
    State(state): State<ApiState>,
    Extension(visibility): Extension<Visibility>,
    TypedMultipart(input): TypedMultipart<IngestParams>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = parse_scope(&input.scope)?;
    let scope_key = visibility.resolve_scope_key(scope)?;

    let original_file_name = input
        .file
        .metadata
        .file_name
        .ok_or_else(|| ApiError::Validation("missing file name".to_string()))?;
    let content_type = input
        .file
        .metadata
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let bytes = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::Validation("uploaded file is empty".to_string()));
    }

    let doc_id = Uuid::new_v4();
    let sanitized = sanitize_file_name(&original_file_name);
    let storage_path = upload_location(&visibility.tenant_id, &doc_id.to_string(), &sanitized);

    state
        .storage
        .put(&storage_path, Bytes::from(bytes))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let document = Document::new(doc_id, scope_key, original_file_name, content_type, storage_path);
    state.meta.insert_document(document.clone()).await?;
    state.queue.push(&document.id).await?;

    let initial = ProgressEvent::new(document.id.clone(), document.scope_key.clone(), Stage::Queued)
        .with_filename(document.filename.clone());
    state.queue.publish(initial);

    Ok((
        StatusCode::OK,
        Json(IngestResponse { doc_id: document.id, status: "queued" }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_scopes_parse() {
        assert!(matches!(parse_scope("tenant"), Ok(Scope::Tenant)));
        assert!(matches!(parse_scope("workspace"), Ok(Scope::Workspace)));
        assert!(matches!(parse_scope("user"), Ok(Scope::User)));
    }

    #[test]
    fn unrecognized_scope_is_a_validation_error() {
        assert!(matches!(parse_scope("global"), Err(ApiError::Validation(_))));
    }
}

