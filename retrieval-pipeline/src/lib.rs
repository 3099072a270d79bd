pub mod pipeline;
pub mod reranker;

pub use pipeline::{retrieve, ChunkSource, GraphDiagnostics, RetrieveRequest, RetrieveResult, RetrievedChunk};
pub use reranker::{FastEmbedReranker, NullReranker, Reranker};
