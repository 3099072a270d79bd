pub mod admin;
pub mod chunker;
pub mod entity_extractor;
pub mod extraction;
pub mod llm;
pub mod prompts;
pub mod state;
pub mod worker;

pub use admin::WorkerSupervisor;
pub use worker::IngestionWorker;
