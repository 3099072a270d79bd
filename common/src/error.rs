use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Core internal error type shared by every crate in the workspace.
///
/// Mirrors the abstract error kinds from the design: `Auth`, `Validation`,
/// `NotFound`, `DependencyTransient`/`DependencyFatal`, `MalformedUpstream`
/// and `Internal`. HTTP-facing crates translate these into status codes.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("Dependency unavailable (transient): {0}")]
    DependencyTransient(String),
    #[error("Dependency unavailable: {0}")]
    DependencyFatal(String),
    #[error("Upstream model returned malformed output: {0}")]
    MalformedUpstream(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the worker should retry the ingestion stage that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DependencyTransient(_) | Self::MalformedUpstream(_)
        )
    }
}
