use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use common::{scope::Visibility, utils::tenants::resolve_tenant};

use crate::{api_state::ApiState, error::ApiError};

/// Resolves `Authorization: Bearer <token>` to a tenant via the static token
/// map, folds in `X-Workspace-Id`/`X-Principal-Id` into a `Visibility`, and
/// attaches it to the request for handlers to read.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
    let tenant_id = resolve_tenant(&state.config, &token)?.to_string();

    let workspace_id = header_value(&request, "x-workspace-id");
    let principal_id = header_value(&request, "x-principal-id");
    let visibility = Visibility::new(tenant_id, workspace_id, principal_id);

    request.extensions_mut().insert(visibility);

    Ok(next.run(request).await)
}

fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer ").map(str::trim))
        .map(String::from)
}

fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
