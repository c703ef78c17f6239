//! Parse -> retrieve -> generate, one request at a time.

use std::path::Path;

use generag_llm::LlmProvider;

use crate::generator::{GeneratorError, ReportGenerator};
use crate::retriever::{ContextRetriever, IngestReport, RetrievedChunk, RetrieverError};
use crate::variant::{ParseError, Variant, format_query_for_rag, parse_variant};

/// Characters of each evidence passage shown alongside a report.
pub const EVIDENCE_PREVIEW_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Retrieval(#[from] RetrieverError),

    #[error(transparent)]
    Generation(#[from] GeneratorError),
}

impl PipelineError {
    /// Errors caused by the user's input rather than by a service or the index.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Parse(_)
                | Self::Retrieval(
                    RetrieverError::FileNotFound(_)
                        | RetrieverError::UnsupportedFormat(_)
                        | RetrieverError::EmptyIndex
                        | RetrieverError::InvalidTopK
                )
        )
    }
}

#[derive(Debug, Clone)]
pub struct ClinicalReport {
    /// Variant text as the user typed it.
    pub input: String,
    pub variant: Variant,
    pub query: String,
    pub markdown: String,
    /// Passages the report was generated from, best match first.
    pub evidence: Vec<RetrievedChunk>,
}

impl ClinicalReport {
    /// `(position, preview)` for each evidence passage, numbered from 1.
    pub fn evidence_previews(&self) -> impl Iterator<Item = (usize, &str)> {
        self.evidence
            .iter()
            .enumerate()
            .map(|(i, c)| (i + 1, c.preview(EVIDENCE_PREVIEW_CHARS)))
    }
}

pub struct ReportPipeline<P> {
    retriever: ContextRetriever,
    generator: ReportGenerator<P>,
}

impl<P: LlmProvider> ReportPipeline<P> {
    pub fn new(retriever: ContextRetriever, generator: ReportGenerator<P>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    #[must_use]
    pub fn retriever(&self) -> &ContextRetriever {
        &self.retriever
    }

    #[must_use]
    pub fn generator(&self) -> &ReportGenerator<P> {
        &self.generator
    }

    /// # Errors
    ///
    /// See [`ContextRetriever::ingest`].
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport, PipelineError> {
        Ok(self.retriever.ingest(path).await?)
    }

    /// Produce a report with the retriever's configured `top_k`.
    ///
    /// # Errors
    ///
    /// See [`ReportPipeline::report_k`].
    pub async fn report(&self, input: &str) -> Result<ClinicalReport, PipelineError> {
        self.report_k(input, self.retriever.options().top_k).await
    }

    /// Parse `input`, retrieve `k` passages for the derived query, and generate
    /// the report.
    ///
    /// Malformed input fails before the index or any service is touched.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Parse`] for malformed input, otherwise the
    /// retrieval or generation error.
    pub async fn report_k(&self, input: &str, k: usize) -> Result<ClinicalReport, PipelineError> {
        let parsed = parse_variant(input);
        let query = format_query_for_rag(&parsed);
        let variant = parsed?;
        tracing::info!(gene = %variant.gene, variant = %variant.variant, "generating report");

        let evidence = self.retriever.search_k(&query, k).await?;
        let markdown = self.generator.generate(input, &evidence).await?;

        Ok(ClinicalReport {
            input: input.to_owned(),
            variant,
            query,
            markdown,
            evidence,
        })
    }
}
