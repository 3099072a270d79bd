use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;

use crate::error::AppError;

/// Remote embedding provider. A batch of N inputs must produce N vectors in
/// the same order; the ingestion worker treats a mismatch as `Internal`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    async fn embed_one(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&input.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::MalformedUpstream("embedder returned no vectors".into()))
    }
}

/// `Embedder` backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: &str, api_key: &str, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(base_url)
            .with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(inputs.to_vec())
            .build()
            .map_err(AppError::OpenAI)?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| AppError::DependencyTransient(e.to_string()))?;

        if response.data.len() != inputs.len() {
            return Err(AppError::MalformedUpstream(format!(
                "embedder returned {} vectors for {} inputs",
                response.data.len(),
                inputs.len()
            )));
        }

        let mut by_index: Vec<(usize, Vec<f32>)> = response
            .data
            .into_iter()
            .map(|d| (d.index as usize, d.embedding))
            .collect();
        by_index.sort_by_key(|(index, _)| *index);

        Ok(by_index.into_iter().map(|(_, v)| v).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEmbedder {
        dims: usize,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            Ok(inputs.iter().map(|_| vec![0.0; self.dims]).collect())
        }
    }

    #[tokio::test]
    async fn embed_one_delegates_to_batch() {
        let embedder = StubEmbedder { dims: 4 };
        let vector = embedder.embed_one("hello").await.expect("embed");
        assert_eq!(vector.len(), 4);
    }

    #[tokio::test]
    async fn embed_batch_preserves_count() {
        let embedder = StubEmbedder { dims: 3 };
        let vectors = embedder
            .embed_batch(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .expect("embed batch");
        assert_eq!(vectors.len(), 3);
    }
}
