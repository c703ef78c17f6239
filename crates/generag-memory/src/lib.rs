//! Literature ingestion and a persisted vector index.
//!
//! Documents are loaded (PDF or plain text), split into overlapping chunks,
//! embedded, and stored in a [`VectorStore`]. The default store is a SQLite
//! database on disk; an in-memory store backs tests.

pub mod document;
pub mod error;
pub mod in_memory_store;
pub mod sqlite_store;
pub mod vector_store;

pub use error::MemoryError;
pub use in_memory_store::InMemoryVectorStore;
pub use sqlite_store::SqliteVectorStore;
pub use vector_store::{
    CollectionSpec, FieldCondition, FieldValue, ReplaceScope, ScoredVectorPoint, VectorFilter,
    VectorPoint, VectorStore, VectorStoreError,
};
