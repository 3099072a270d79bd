pub mod error;
pub mod llm;
pub mod scope;
pub mod storage;
pub mod utils;

pub use error::AppError;
pub use scope::{Scope, ScopeKey, Visibility};
