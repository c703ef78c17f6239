//! Clinical report synthesis from retrieved literature.

use std::time::Duration;

use generag_llm::{LlmError, LlmProvider, Message};

use crate::redact::redact_secrets;
use crate::retriever::RetrievedChunk;

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("report generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("the model returned an empty report")]
    EmptyReport,

    #[error("report generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Join passages in retrieval order, separated by blank lines.
#[must_use]
pub fn join_context(context: &[RetrievedChunk]) -> String {
    context
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fill the report template with the context block and the variant as typed.
#[must_use]
pub fn build_prompt(variant_query: &str, context: &str) -> String {
    format!(
        "SYSTEM: You are a world-class Clinical Geneticist and Bioinformatician.
Your task is to interpret the following genetic variant based ONLY on the provided research context.
Do not use outside knowledge. If the context is insufficient, state explicitly that more clinical evidence is needed.

CONTEXT:
{context}

VARIANT QUERY:
{variant_query}

INSTRUCTIONS:
- Provide a summary of the variant's clinical significance.
- Mention potential therapeutic implications if available.
- Maintain a professional, medical-grade tone.
- Structure the output using Markdown.

ANSWER:
"
    )
}

pub struct ReportGenerator<P> {
    provider: P,
    timeout: Duration,
}

impl<P: LlmProvider> ReportGenerator<P> {
    pub fn new(provider: P, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Ask the model for a Markdown report grounded in `context`.
    ///
    /// The reply is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::Generation`] when the provider fails,
    /// [`GeneratorError::EmptyReport`] for a blank reply, and
    /// [`GeneratorError::Timeout`] when the deadline passes.
    pub async fn generate(
        &self,
        variant_query: &str,
        context: &[RetrievedChunk],
    ) -> Result<String, GeneratorError> {
        let prompt = build_prompt(variant_query, &join_context(context));
        let messages = [Message::user(prompt)];

        let reply = match tokio::time::timeout(self.timeout, self.provider.chat(&messages)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    "generation failed: {}",
                    redact_secrets(&e.to_string())
                );
                return Err(e.into());
            }
            Err(_) => return Err(GeneratorError::Timeout(self.timeout)),
        };

        if reply.trim().is_empty() {
            return Err(GeneratorError::EmptyReport);
        }
        tracing::debug!(chars = reply.len(), passages = context.len(), "report generated");
        Ok(reply)
    }
}
