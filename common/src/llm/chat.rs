use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Chat/LLM client used by the chunker and entity extractor to obtain
/// structured JSON completions. Both callers ask for a JSON schema and
/// deserialize the response; a malformed or unparseable reply surfaces as
/// `AppError::MalformedUpstream`, which the worker's retry policy treats as
/// transient.
pub struct ChatClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ChatClient {
    pub fn new(base_url: &str, api_key: &str, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(base_url)
            .with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }

    /// Send a system+user prompt pair and deserialize the response content
    /// against `schema_name`/`schema`, a JSON Schema object describing `T`.
    pub async fn complete_structured<T: DeserializeOwned>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<T, AppError> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: schema_name.to_string(),
                schema: Some(schema),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(system_prompt).into(),
                ChatCompletionRequestUserMessage::from(user_prompt).into(),
            ])
            .response_format(response_format)
            .build()
            .map_err(AppError::OpenAI)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::DependencyTransient(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| AppError::MalformedUpstream("no content in chat response".into()))?;

        serde_json::from_str::<T>(content)
            .map_err(|e| AppError::MalformedUpstream(format!("failed to parse LLM JSON: {e}")))
    }
}
