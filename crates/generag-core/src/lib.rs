//! Variant parsing, context retrieval, and clinical report generation.

pub mod config;
pub mod generator;
pub mod pipeline;
pub mod redact;
pub mod retriever;
pub mod variant;
pub mod vault;

pub use config::Config;
pub use generator::{GeneratorError, ReportGenerator};
pub use pipeline::{ClinicalReport, PipelineError, ReportPipeline};
pub use retriever::{
    ContextRetriever, IngestReport, RetrievedChunk, RetrieverError, RetrieverOptions,
};
pub use variant::{ParseError, Variant, format_query_for_rag, parse_variant};
