#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] generag_llm::LlmError),

    #[error("storage error: {0}")]
    Storage(#[from] crate::error::MemoryError),
}

impl From<crate::vector_store::VectorStoreError> for DocumentError {
    fn from(e: crate::vector_store::VectorStoreError) -> Self {
        Self::Storage(e.into())
    }
}
