use std::{
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::available_parallelism,
};

use async_trait::async_trait;
use common::{error::AppError, utils::config::AppConfig};
use fastembed::{RerankInitOptions, TextRerank};
use tokio::sync::{Mutex, Semaphore};

/// Cross-encoder scorer for the retrieval pipeline's two rerank passes.
/// `score` returns one relevance score per input text, same order as given.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, AppError>;
}

/// Ranking-preserving fallback used when reranking is disabled or when a
/// live rerank call fails mid-request: the caller keeps the hybrid-search
/// ordering by treating it as every text scoring the same.
pub struct NullReranker;

#[async_trait]
impl Reranker for NullReranker {
    async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>, AppError> {
        Ok(vec![0.0; texts.len()])
    }
}

static NEXT_ENGINE: AtomicUsize = AtomicUsize::new(0);

fn pick_engine_index(pool_len: usize) -> usize {
    let n = NEXT_ENGINE.fetch_add(1, Ordering::Relaxed);
    n % pool_len
}

/// `Reranker` backed by a small pool of local `fastembed` cross-encoders.
/// A pool (rather than one shared engine) lets `concurrency` overlapping
/// retrieve requests avoid serializing entirely on a single model instance,
/// bounded by the same counting-semaphore pattern the ingestion worker uses
/// for in-flight documents.
pub struct FastEmbedReranker {
    engines: Vec<Arc<Mutex<TextRerank>>>,
    semaphore: Arc<Semaphore>,
}

impl FastEmbedReranker {
    pub fn new(config: &AppConfig, pool_size: usize) -> Result<Self, AppError> {
        let pool_size = pool_size.max(1);
        let cache_dir = PathBuf::from(&config.model_cache_dir).join("reranker");
        fs::create_dir_all(&cache_dir)?;

        let mut init_options = RerankInitOptions::default();
        init_options.cache_dir = cache_dir;

        let mut engines = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let engine = TextRerank::try_new(init_options.clone())
                .map_err(|e| AppError::Internal(format!("failed to load reranker model: {e}")))?;
            engines.push(Arc::new(Mutex::new(engine)));
        }

        Ok(Self {
            engines,
            semaphore: Arc::new(Semaphore::new(pool_size)),
        })
    }

    /// Default pool size when the deployment doesn't configure one
    /// explicitly: a couple of engines is enough to avoid full
    /// serialization without loading the model many times over.
    pub fn default_pool_size() -> usize {
        available_parallelism()
            .map(|value| value.get().min(2))
            .unwrap_or(2)
            .max(1)
    }
}

#[async_trait]
impl Reranker for FastEmbedReranker {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("reranker semaphore never closed");
        let idx = pick_engine_index(self.engines.len());
        let engine = Arc::clone(&self.engines[idx]);

        let mut guard = engine.lock().await;
        let results = guard
            .rerank(query.to_owned(), texts.to_vec(), false, None)
            .map_err(|e| AppError::Internal(format!("rerank failed: {e}")))?;

        let mut scores = vec![0.0f32; texts.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
            }
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_reranker_returns_zeroed_scores_in_order() {
        let reranker = NullReranker;
        let scores = reranker
            .score("query", &["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn null_reranker_handles_empty_input() {
        let reranker = NullReranker;
        let scores = reranker.score("query", &[]).await.unwrap();
        assert!(scores.is_empty());
    }
}
