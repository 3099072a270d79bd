use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Clone, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Memory,
}

/// Process-wide configuration, sourced from `config.{toml,yaml,json}` (optional)
/// overlaid with environment variables. Mirrors the recognized options from the
/// design: embedding/LLM endpoints, chunker windowing, store toggles and the
/// static tenant token map.
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,

    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub storage: StorageKind,

    #[serde(default = "default_embeddings_base_url")]
    pub embeddings_base_url: String,
    #[serde(default = "default_embeddings_model")]
    pub embeddings_model: String,

    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_chunker_window_tokens")]
    pub chunker_window_tokens: usize,
    #[serde(default = "default_chunker_overlap_tokens")]
    pub chunker_overlap_tokens: usize,

    #[serde(default = "default_vector_collection")]
    pub vector_collection: String,

    #[serde(default = "default_graph_enabled")]
    pub graph_enabled: bool,

    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    #[serde(default = "default_progress_channel")]
    pub progress_channel: String,

    /// Bearer token -> resolved tenant id, parsed from `RAG_TENANTS_JSON`.
    #[serde(default)]
    pub tenants: HashMap<String, String>,

    #[serde(default = "default_model_cache_dir")]
    pub model_cache_dir: String,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_reranker_enabled")]
    pub reranker_enabled: bool,
    #[serde(default = "default_reranker_pool_size")]
    pub reranker_pool_size: usize,
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_embeddings_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embeddings_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_chunker_window_tokens() -> usize {
    2048
}

fn default_chunker_overlap_tokens() -> usize {
    256
}

fn default_vector_collection() -> String {
    "documents".to_string()
}

fn default_graph_enabled() -> bool {
    true
}

fn default_queue_name() -> String {
    "ingestion_jobs".to_string()
}

fn default_progress_channel() -> String {
    "ingestion_progress".to_string()
}

fn default_model_cache_dir() -> String {
    "./data/models".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_reranker_enabled() -> bool {
    true
}

fn default_reranker_pool_size() -> usize {
    2
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().try_parsing(true))
        .build()?;

    let mut cfg: AppConfig = config.try_deserialize()?;

    if let Ok(raw) = std::env::var("RAG_TENANTS_JSON") {
        if let Ok(parsed) = serde_json::from_str::<HashMap<String, String>>(&raw) {
            cfg.tenants = parsed;
        }
    }

    Ok(cfg)
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            openai_api_key: "test".into(),
            surrealdb_address: "mem://".into(),
            surrealdb_username: "test".into(),
            surrealdb_password: "test".into(),
            surrealdb_namespace: "test".into(),
            surrealdb_database: "test".into(),
            http_port: 0,
            data_dir: "/tmp/rag-test".into(),
            storage: StorageKind::Memory,
            embeddings_base_url: default_embeddings_base_url(),
            embeddings_model: default_embeddings_model(),
            llm_base_url: default_llm_base_url(),
            llm_model: default_llm_model(),
            chunker_window_tokens: default_chunker_window_tokens(),
            chunker_overlap_tokens: default_chunker_overlap_tokens(),
            vector_collection: default_vector_collection(),
            graph_enabled: true,
            queue_name: default_queue_name(),
            progress_channel: default_progress_channel(),
            tenants: HashMap::new(),
            model_cache_dir: default_model_cache_dir(),
            worker_concurrency: default_worker_concurrency(),
            reranker_enabled: default_reranker_enabled(),
            reranker_pool_size: default_reranker_pool_size(),
        }
    }
}
