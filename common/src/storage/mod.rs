pub mod db;
pub mod graph_store;
pub mod meta_store;
pub mod queue;
pub mod store;
pub mod types;
pub mod vector_store;

pub use db::SurrealDbClient;
pub use graph_store::{GraphStore, NullGraphStore, SurrealGraphStore};
pub use meta_store::{MetaStore, SurrealMetaStore};
pub use queue::{Queue, SurrealQueue};
pub use vector_store::{SurrealVectorStore, VectorStore};
