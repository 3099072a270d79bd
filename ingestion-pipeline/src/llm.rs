use async_trait::async_trait;
use common::{error::AppError, llm::ChatClient};
use serde_json::Value;

/// The narrow chat-completion surface the chunker and entity extractor
/// depend on. Scoped down from `ChatClient::complete_structured`'s generic
/// signature (not object-safe) so tests can stub it with a plain struct
/// returning canned JSON instead of a live model.
#[async_trait]
pub trait Completions: Send + Sync {
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: Value,
    ) -> Result<Value, AppError>;
}

#[async_trait]
impl Completions for ChatClient {
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: Value,
    ) -> Result<Value, AppError> {
        self.complete_structured(system_prompt, user_prompt, schema_name, schema)
            .await
    }
}
