use std::collections::BTreeSet;
use std::sync::Arc;

use generag_llm::EmbedFn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Chunk, Document, DocumentError, DocumentLoader, TextSplitter};
use crate::vector_store::{CollectionSpec, ReplaceScope, VectorFilter, VectorPoint, VectorStore};

/// What happens to existing chunks when a file is ingested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestPolicy {
    /// Replace chunks previously ingested from the same source; keep the rest.
    #[default]
    Merge,
    /// Drop the whole collection before writing.
    Replace,
}

impl std::str::FromStr for IngestPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "replace" => Ok(Self::Replace),
            other => Err(format!("unknown ingest policy: {other}")),
        }
    }
}

pub struct IngestionPipeline {
    splitter: TextSplitter,
    store: Arc<dyn VectorStore>,
    collection: String,
    embedding_model: String,
    policy: IngestPolicy,
    embed_fn: EmbedFn,
}

impl IngestionPipeline {
    pub fn new(
        splitter: TextSplitter,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        embedding_model: impl Into<String>,
        embed_fn: EmbedFn,
    ) -> Self {
        Self {
            splitter,
            store,
            collection: collection.into(),
            embedding_model: embedding_model.into(),
            policy: IngestPolicy::default(),
            embed_fn,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: IngestPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ingest a document: split -> embed -> store. Returns chunk count.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or storage fails.
    pub async fn ingest(&self, document: Document) -> Result<usize, DocumentError> {
        self.ingest_all(vec![document]).await
    }

    /// # Errors
    ///
    /// Returns an error if loading, embedding, or storage fails.
    pub async fn load_and_ingest(
        &self,
        loader: &(dyn DocumentLoader + '_),
        path: &std::path::Path,
    ) -> Result<usize, DocumentError> {
        let documents = loader.load(path).await?;
        self.ingest_all(documents).await
    }

    /// Every chunk is embedded before anything is written, and the old chunks are
    /// swapped for the new ones in a single store operation. Any failure leaves
    /// the index untouched.
    async fn ingest_all(&self, documents: Vec<Document>) -> Result<usize, DocumentError> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|d| self.splitter.split(d))
            .collect();
        if chunks.is_empty() {
            tracing::info!(collection = %self.collection, "no text to ingest");
            return Ok(0);
        }

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let vector = (self.embed_fn)(&chunk.content).await?;
            points.push(VectorPoint {
                id: point_id(&chunk.metadata.source, chunk.chunk_index),
                vector,
                payload: chunk.payload(),
            });
        }

        let spec = CollectionSpec {
            vector_size: points[0].vector.len() as u64,
            embedding_model: self.embedding_model.clone(),
        };

        let scope = match self.policy {
            IngestPolicy::Replace => ReplaceScope::Collection,
            IngestPolicy::Merge => {
                let sources: BTreeSet<&str> =
                    chunks.iter().map(|c| c.metadata.source.as_str()).collect();
                ReplaceScope::Matching(
                    sources
                        .into_iter()
                        .map(|source| VectorFilter::text_eq("source", source))
                        .collect(),
                )
            }
        };

        let count = points.len();
        let removed = self
            .store
            .replace_points(&self.collection, &spec, scope, points)
            .await?;
        if removed > 0 {
            tracing::debug!(collection = %self.collection, removed, "replaced previously ingested chunks");
        }
        tracing::info!(collection = %self.collection, chunks = count, policy = ?self.policy, "ingested");
        Ok(count)
    }
}

/// Stable id for a chunk, so re-ingesting a source overwrites instead of duplicating.
fn point_id(source: &str, chunk_index: usize) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{source}#{chunk_index}").as_bytes()).to_string()
}
