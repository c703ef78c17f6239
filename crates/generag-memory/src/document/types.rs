use std::collections::HashMap;

use serde_json::json;

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    /// Canonical path of the file the text came from.
    pub source: String,
    pub content_type: String,
}

impl DocumentMetadata {
    #[must_use]
    pub fn new(source: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content_type: content_type.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub chunk_index: usize,
}

impl Chunk {
    /// Payload stored alongside the chunk's vector.
    #[must_use]
    pub fn payload(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("source".to_owned(), json!(self.metadata.source)),
            ("content_type".to_owned(), json!(self.metadata.content_type)),
            ("chunk_index".to_owned(), json!(self.chunk_index)),
            ("content".to_owned(), json!(self.content)),
        ])
    }
}
