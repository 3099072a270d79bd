use crate::{error::AppError, utils::config::AppConfig};

/// Resolves a bearer token to a tenant id via the static `RAG_TENANTS_JSON`
/// map. Unknown tokens are an auth failure, not a not-found.
pub fn resolve_tenant<'a>(config: &'a AppConfig, bearer_token: &str) -> Result<&'a str, AppError> {
    config
        .tenants
        .get(bearer_token)
        .map(|s| s.as_str())
        .ok_or_else(|| AppError::Auth("unrecognized API token".into()))
}
