//! Literature ingestion and top-k passage retrieval over a persisted index.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use generag_llm::provider::embed_fn_with_timeout;
use generag_llm::{EmbedFn, LlmError};
use generag_memory::document::{
    DEFAULT_MAX_FILE_SIZE, DocumentError, IngestPolicy, IngestionPipeline, SplitterConfig,
    TextSplitter, loader_for,
};
use generag_memory::{
    MemoryError, ScoredVectorPoint, SqliteVectorStore, VectorStore, VectorStoreError,
};
use tokio::sync::{RwLock, RwLockReadGuard};

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error("the literature index is empty; ingest a document first")]
    EmptyIndex,

    #[error("index was built with embedding model {indexed}, but {configured} is configured")]
    EmbeddingModelMismatch { indexed: String, configured: String },

    #[error("embedding service failed: {0}")]
    Embedding(#[source] LlmError),

    #[error("document ingestion failed: {0}")]
    Document(#[source] DocumentError),

    #[error("vector index error: {0}")]
    Index(#[from] VectorStoreError),

    #[error("failed to open vector index: {0}")]
    Open(#[from] MemoryError),
}

impl From<DocumentError> for RetrieverError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::UnsupportedFormat(ext) => Self::UnsupportedFormat(ext),
            DocumentError::Embedding(e) => Self::Embedding(e),
            other => Self::Document(other),
        }
    }
}

/// One passage returned by [`ContextRetriever::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    pub source: String,
    pub chunk_index: usize,
}

impl RetrievedChunk {
    fn from_point(point: ScoredVectorPoint) -> Self {
        let str_field = |name: &str| {
            point
                .payload
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_owned()
        };
        Self {
            text: str_field("content"),
            source: str_field("source"),
            chunk_index: point
                .payload
                .get("chunk_index")
                .and_then(serde_json::Value::as_u64)
                .and_then(|i| usize::try_from(i).ok())
                .unwrap_or_default(),
            score: point.score,
        }
    }

    /// First `max_chars` characters of the passage.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source: String,
    pub chunks: usize,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully ingested {} chunks from {}.",
            self.chunks, self.source
        )
    }
}

pub type OpenIndexFuture =
    Pin<Box<dyn Future<Output = Result<Arc<dyn VectorStore>, MemoryError>> + Send>>;

/// Opens (or reopens) the backing index.
pub type OpenIndexFn = Box<dyn Fn() -> OpenIndexFuture + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RetrieverOptions {
    pub collection: String,
    pub embedding_model: String,
    pub splitter: TextSplitter,
    pub ingest_policy: IngestPolicy,
    pub max_file_size: u64,
    pub top_k: usize,
    pub embedding_timeout: Duration,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            collection: "literature".into(),
            embedding_model: "text-embedding-3-small".into(),
            splitter: TextSplitter::new(SplitterConfig::default()),
            ingest_policy: IngestPolicy::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            top_k: DEFAULT_TOP_K,
            embedding_timeout: Duration::from_secs(30),
        }
    }
}

enum IndexState {
    Closed,
    Loaded(Arc<dyn VectorStore>),
}

/// Owns the index handle. Ingestion and reload take the write lock; searches
/// share the read lock.
pub struct ContextRetriever {
    state: RwLock<IndexState>,
    open: OpenIndexFn,
    embed: Arc<EmbedFn>,
    options: RetrieverOptions,
}

impl fmt::Debug for ContextRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRetriever")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ContextRetriever {
    /// The index is not opened until first use.
    #[must_use]
    pub fn new(open: OpenIndexFn, embed: EmbedFn, options: RetrieverOptions) -> Self {
        let embed = embed_fn_with_timeout(embed, options.embedding_timeout);
        Self {
            state: RwLock::new(IndexState::Closed),
            open,
            embed: Arc::new(embed),
            options,
        }
    }

    /// Retriever backed by the SQLite index file at `db_path`.
    #[must_use]
    pub fn sqlite(db_path: PathBuf, embed: EmbedFn, options: RetrieverOptions) -> Self {
        let open: OpenIndexFn = Box::new(move || {
            let path = db_path.clone();
            Box::pin(async move {
                let store = SqliteVectorStore::open(&path).await?;
                tracing::debug!(path = %path.display(), "opened vector index");
                Ok(Arc::new(store) as Arc<dyn VectorStore>)
            })
        });
        Self::new(open, embed, options)
    }

    /// Retriever over an already constructed store.
    #[must_use]
    pub fn with_store(
        store: Arc<dyn VectorStore>,
        embed: EmbedFn,
        options: RetrieverOptions,
    ) -> Self {
        let open: OpenIndexFn = Box::new(move || {
            let store = Arc::clone(&store);
            Box::pin(async move { Ok(store) })
        });
        Self::new(open, embed, options)
    }

    #[must_use]
    pub fn options(&self) -> &RetrieverOptions {
        &self.options
    }

    pub async fn is_loaded(&self) -> bool {
        matches!(*self.state.read().await, IndexState::Loaded(_))
    }

    /// Drop the current handle and open the index again.
    ///
    /// # Errors
    ///
    /// Returns [`RetrieverError::Open`] if the index cannot be opened; the handle
    /// is left closed.
    pub async fn reload(&self) -> Result<(), RetrieverError> {
        let mut state = self.state.write().await;
        *state = IndexState::Closed;
        *state = IndexState::Loaded((self.open)().await?);
        tracing::info!(collection = %self.options.collection, "index reloaded");
        Ok(())
    }

    /// Load a document, split it, embed every chunk, and write it to the index.
    ///
    /// # Errors
    ///
    /// Returns [`RetrieverError::FileNotFound`] for a missing path,
    /// [`RetrieverError::UnsupportedFormat`] for unknown extensions, and
    /// embedding or storage errors otherwise. On error the index is unchanged.
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport, RetrieverError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(RetrieverError::FileNotFound(path.to_path_buf())),
        }
        let loader = loader_for(path, self.options.max_file_size)?;

        let mut state = self.state.write().await;
        let store = match &*state {
            IndexState::Loaded(store) => Arc::clone(store),
            IndexState::Closed => {
                let store = (self.open)().await?;
                *state = IndexState::Loaded(Arc::clone(&store));
                store
            }
        };

        if self.options.ingest_policy == IngestPolicy::Merge {
            self.check_model(store.as_ref()).await?;
        }

        let embed = Arc::clone(&self.embed);
        let pipeline = IngestionPipeline::new(
            self.options.splitter.clone(),
            store,
            self.options.collection.clone(),
            self.options.embedding_model.clone(),
            Box::new(move |text: &str| (embed.as_ref())(text)),
        )
        .with_policy(self.options.ingest_policy);

        let chunks = pipeline.load_and_ingest(loader.as_ref(), path).await?;
        drop(state);

        let report = IngestReport {
            source: path.display().to_string(),
            chunks,
        };
        tracing::info!(source = %report.source, chunks, "document ingested");
        Ok(report)
    }

    /// Search with the configured `top_k`.
    ///
    /// # Errors
    ///
    /// See [`ContextRetriever::search_k`].
    pub async fn search(&self, query: &str) -> Result<Vec<RetrievedChunk>, RetrieverError> {
        self.search_k(query, self.options.top_k).await
    }

    /// Return at most `k` passages ranked by descending similarity to `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrieverError::InvalidTopK`] for `k == 0`,
    /// [`RetrieverError::EmptyIndex`] when nothing has been ingested,
    /// [`RetrieverError::EmbeddingModelMismatch`] when the index was built with a
    /// different embedding model, and embedding or index errors otherwise.
    pub async fn search_k(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrieverError> {
        if k == 0 {
            return Err(RetrieverError::InvalidTopK);
        }
        let (_guard, store) = self.read_store().await?;
        let collection = &self.options.collection;

        self.check_model(store.as_ref()).await?;
        if store.count(collection).await? == 0 {
            return Err(RetrieverError::EmptyIndex);
        }

        let vector = (self.embed.as_ref())(query).await.map_err(RetrieverError::Embedding)?;
        let hits = store
            .search(collection, vector, k as u64, None)
            .await?
            .into_iter()
            .map(RetrievedChunk::from_point)
            .collect::<Vec<_>>();
        tracing::debug!(k, hits = hits.len(), "retrieved context");
        Ok(hits)
    }

    /// Fails when the collection exists but was built with another embedding model.
    async fn check_model(&self, store: &dyn VectorStore) -> Result<(), RetrieverError> {
        if let Some(spec) = store.collection_spec(&self.options.collection).await?
            && spec.embedding_model != self.options.embedding_model
        {
            return Err(RetrieverError::EmbeddingModelMismatch {
                indexed: spec.embedding_model,
                configured: self.options.embedding_model.clone(),
            });
        }
        Ok(())
    }

    /// Read guard plus the loaded store, opening the index first if needed.
    async fn read_store(
        &self,
    ) -> Result<(RwLockReadGuard<'_, IndexState>, Arc<dyn VectorStore>), RetrieverError> {
        loop {
            let guard = self.state.read().await;
            let loaded = match &*guard {
                IndexState::Loaded(store) => Some(Arc::clone(store)),
                IndexState::Closed => None,
            };
            if let Some(store) = loaded {
                return Ok((guard, store));
            }
            drop(guard);

            let mut state = self.state.write().await;
            if matches!(*state, IndexState::Closed) {
                *state = IndexState::Loaded((self.open)().await?);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use generag_llm::mock::MockProvider;
    use generag_llm::provider::embed_fn;
    use generag_memory::InMemoryVectorStore;

    fn options() -> RetrieverOptions {
        RetrieverOptions {
            embedding_model: "hashed".into(),
            splitter: TextSplitter::new(SplitterConfig {
                chunk_size: 80,
                chunk_overlap: 0,
                ..SplitterConfig::default()
            }),
            ..RetrieverOptions::default()
        }
    }

    fn retriever(store: Arc<InMemoryVectorStore>) -> ContextRetriever {
        ContextRetriever::with_store(
            store,
            embed_fn(Arc::new(MockProvider::default())),
            options(),
        )
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    const LITERATURE: &str = "BRAF V600E is sensitive to vemurafenib and dabrafenib.\n\n\
        KRAS G12C can be targeted with sotorasib in lung cancer.\n\n\
        EGFR T790M confers resistance to first generation inhibitors.\n\n\
        TP53 R175H is a hotspot with no approved targeted therapy.\n\n\
        ALK fusions respond to crizotinib and alectinib.";

    #[tokio::test]
    async fn missing_file_is_reported() {
        let r = retriever(Arc::new(InMemoryVectorStore::new()));
        let err = r.ingest(Path::new("/nonexistent/paper.pdf")).await.unwrap_err();
        assert!(matches!(err, RetrieverError::FileNotFound(_)));
        assert!(!r.is_loaded().await);
    }

    #[tokio::test]
    async fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "calls.vcf", "#CHROM POS");
        let r = retriever(Arc::new(InMemoryVectorStore::new()));
        assert!(matches!(
            r.ingest(&path).await,
            Err(RetrieverError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn ingest_report_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "lit.txt", LITERATURE);
        let r = retriever(Arc::new(InMemoryVectorStore::new()));
        let report = r.ingest(&path).await.unwrap();
        assert_eq!(report.chunks, 5);
        assert_eq!(
            report.to_string(),
            format!("Successfully ingested 5 chunks from {}.", path.display())
        );
        assert!(r.is_loaded().await);
    }

    #[tokio::test]
    async fn search_before_ingest_is_empty_index() {
        let r = retriever(Arc::new(InMemoryVectorStore::new()));
        assert!(matches!(
            r.search("anything").await,
            Err(RetrieverError::EmptyIndex)
        ));
        assert!(r.is_loaded().await);
    }

    #[tokio::test]
    async fn zero_k_rejected() {
        let r = retriever(Arc::new(InMemoryVectorStore::new()));
        assert!(matches!(
            r.search_k("q", 0).await,
            Err(RetrieverError::InvalidTopK)
        ));
    }

    #[tokio::test]
    async fn results_bounded_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "lit.txt", LITERATURE);
        let r = retriever(Arc::new(InMemoryVectorStore::new()));
        r.ingest(&path).await.unwrap();

        for k in 1..=7 {
            let hits = r.search_k("BRAF V600E vemurafenib", k).await.unwrap();
            assert_eq!(hits.len(), k.min(5));
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        }
        let top = r.search_k("BRAF V600E vemurafenib", 1).await.unwrap();
        assert!(top[0].text.contains("vemurafenib"));
        assert_eq!(top[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn search_does_not_mutate_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "lit.txt", LITERATURE);
        let store = Arc::new(InMemoryVectorStore::new());
        let r = retriever(Arc::clone(&store));
        r.ingest(&path).await.unwrap();
        let before = store.count("literature").await.unwrap();
        r.search("KRAS G12C").await.unwrap();
        assert_eq!(store.count("literature").await.unwrap(), before);
    }

    #[tokio::test]
    async fn model_mismatch_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "lit.txt", LITERATURE);
        let store = Arc::new(InMemoryVectorStore::new());
        retriever(Arc::clone(&store)).ingest(&path).await.unwrap();

        let other = ContextRetriever::with_store(
            store,
            embed_fn(Arc::new(MockProvider::default())),
            RetrieverOptions {
                embedding_model: "another-model".into(),
                ..options()
            },
        );
        assert!(matches!(
            other.search("BRAF").await,
            Err(RetrieverError::EmbeddingModelMismatch { .. })
        ));
        assert!(matches!(
            other.ingest(&path).await,
            Err(RetrieverError::EmbeddingModelMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn embedding_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "lit.txt", LITERATURE);
        let r = ContextRetriever::with_store(
            Arc::new(InMemoryVectorStore::new()),
            embed_fn(Arc::new(MockProvider::default().with_failing_embeddings())),
            options(),
        );
        assert!(matches!(
            r.ingest(&path).await,
            Err(RetrieverError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn slow_embedding_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "lit.txt", LITERATURE);
        let r = ContextRetriever::with_store(
            Arc::new(InMemoryVectorStore::new()),
            embed_fn(Arc::new(MockProvider::default().with_delay(500))),
            RetrieverOptions {
                embedding_timeout: Duration::from_millis(20),
                ..options()
            },
        );
        assert!(matches!(
            r.ingest(&path).await,
            Err(RetrieverError::Embedding(LlmError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn reload_reopens_handle() {
        let r = retriever(Arc::new(InMemoryVectorStore::new()));
        assert!(!r.is_loaded().await);
        r.reload().await.unwrap();
        assert!(r.is_loaded().await);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let chunk = RetrievedChunk {
            text: "ééééé".into(),
            score: 1.0,
            source: "s".into(),
            chunk_index: 0,
        };
        assert_eq!(chunk.preview(3), "ééé");
        assert_eq!(chunk.preview(10), "ééééé");
    }
}
