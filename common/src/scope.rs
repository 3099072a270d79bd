use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The three nested scoping levels an artifact can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Tenant,
    Workspace,
    User,
}

/// Identifies what scope a stored artifact belongs to.
///
/// Invariants: `scope=Tenant` implies `workspace_id` and `principal_id` are
/// unset; `scope=Workspace` implies `workspace_id` is set and `principal_id`
/// unset; `scope=User` implies both are set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub tenant_id: String,
    pub scope: Scope,
    pub workspace_id: Option<String>,
    pub principal_id: Option<String>,
}

impl ScopeKey {
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            scope: Scope::Tenant,
            workspace_id: None,
            principal_id: None,
        }
    }

    pub fn workspace(tenant_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            scope: Scope::Workspace,
            workspace_id: Some(workspace_id.into()),
            principal_id: None,
        }
    }

    pub fn user(
        tenant_id: impl Into<String>,
        workspace_id: impl Into<String>,
        principal_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            scope: Scope::User,
            workspace_id: Some(workspace_id.into()),
            principal_id: Some(principal_id.into()),
        }
    }

    /// Validates the invariants linking `scope` to which optional fields are set.
    pub fn validate(&self) -> Result<(), AppError> {
        match self.scope {
            Scope::Tenant => {
                if self.workspace_id.is_some() || self.principal_id.is_some() {
                    return Err(AppError::Validation(
                        "tenant scope must not set workspace_id or principal_id".into(),
                    ));
                }
            }
            Scope::Workspace => {
                if self.workspace_id.is_none() {
                    return Err(AppError::Validation(
                        "workspace scope requires workspace_id".into(),
                    ));
                }
                if self.principal_id.is_some() {
                    return Err(AppError::Validation(
                        "workspace scope must not set principal_id".into(),
                    ));
                }
            }
            Scope::User => {
                if self.workspace_id.is_none() || self.principal_id.is_none() {
                    return Err(AppError::Validation(
                        "user scope requires both workspace_id and principal_id".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// The set of `ScopeKey`s a caller may observe, derived from their resolved
/// tenant and the `X-Workspace-Id`/`X-Principal-Id` headers they supplied.
///
/// Membership always includes the bare tenant key. Supplying a workspace id
/// extends it to that workspace; supplying a principal id on top of that
/// extends it further to that principal. A caller who never supplies a
/// workspace id can never see workspace- or user-scoped artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visibility {
    pub tenant_id: String,
    pub workspace_id: Option<String>,
    pub principal_id: Option<String>,
}

impl Visibility {
    pub fn new(
        tenant_id: impl Into<String>,
        workspace_id: Option<String>,
        principal_id: Option<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            workspace_id,
            principal_id,
        }
    }

    /// Resolve the requested scope for an inbound write/query, validating
    /// that the workspace/principal headers the request supplies are
    /// sufficient for the requested scope.
    pub fn resolve_scope_key(&self, scope: Scope) -> Result<ScopeKey, AppError> {
        let key = match scope {
            Scope::Tenant => ScopeKey::tenant(&self.tenant_id),
            Scope::Workspace => {
                let workspace_id = self
                    .workspace_id
                    .clone()
                    .ok_or_else(|| AppError::Validation("X-Workspace-Id is required".into()))?;
                ScopeKey::workspace(&self.tenant_id, workspace_id)
            }
            Scope::User => {
                let workspace_id = self
                    .workspace_id
                    .clone()
                    .ok_or_else(|| AppError::Validation("X-Workspace-Id is required".into()))?;
                let principal_id = self
                    .principal_id
                    .clone()
                    .ok_or_else(|| AppError::Validation("X-Principal-Id is required".into()))?;
                ScopeKey::user(&self.tenant_id, workspace_id, principal_id)
            }
        };
        key.validate()?;
        Ok(key)
    }

    /// Whether `key` lies within this visibility set.
    pub fn allows(&self, key: &ScopeKey) -> bool {
        if key.tenant_id != self.tenant_id {
            return false;
        }
        match key.scope {
            Scope::Tenant => true,
            Scope::Workspace => {
                key.workspace_id.is_some() && key.workspace_id == self.workspace_id
            }
            Scope::User => {
                key.workspace_id.is_some()
                    && key.workspace_id == self.workspace_id
                    && key.principal_id.is_some()
                    && key.principal_id == self.principal_id
            }
        }
    }

    /// The set of `(scope, workspace_id, principal_id)` combinations this
    /// visibility includes, suitable for building an `IN`-style store filter.
    pub fn scope_keys(&self) -> Vec<ScopeKey> {
        let mut keys = vec![ScopeKey::tenant(&self.tenant_id)];
        if let Some(workspace_id) = &self.workspace_id {
            keys.push(ScopeKey::workspace(&self.tenant_id, workspace_id.clone()));
            if let Some(principal_id) = &self.principal_id {
                keys.push(ScopeKey::user(
                    &self.tenant_id,
                    workspace_id.clone(),
                    principal_id.clone(),
                ));
            }
        }
        keys
    }
}
