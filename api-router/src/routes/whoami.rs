use axum::{response::IntoResponse, Extension, Json};
use common::scope::Visibility;
use serde::Serialize;

#[derive(Serialize)]
pub struct WhoAmI {
    tenant_id: String,
    workspace_id: Option<String>,
    principal_id: Option<String>,
}

pub async fn whoami(Extension(visibility): Extension<Visibility>) -> impl IntoResponse {
    Json(WhoAmI {
        tenant_id: visibility.tenant_id,
        workspace_id: visibility.workspace_id,
        principal_id: visibility.principal_id,
    })
}
