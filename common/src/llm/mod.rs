pub mod chat;
pub mod embedder;

pub use chat::ChatClient;
pub use embedder::{Embedder, OpenAiEmbedder};
