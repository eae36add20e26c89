// src/db/mod.rs
// SQLite-backed storage adapters

pub mod log;
pub mod pool;
pub mod schema;
pub mod vector;

pub use log::{SqliteExecutionLog, SqliteTaskOutputs};
pub use pool::DatabasePool;
pub use vector::{SqliteVectorStore, distance_to_score, embedding_to_bytes};
