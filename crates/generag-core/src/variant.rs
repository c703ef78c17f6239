//! Free-text variant identifiers such as `BRAF V600E`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Message returned for any input that is not `GENE MUTATION`.
pub const PARSE_ERROR_MESSAGE: &str =
    "Invalid format. Please use 'Gene Mutation' format (e.g., BRAF V600E).";

// Gene symbols are uppercase letters and digits; the mutation is everything
// after the first run of whitespace, newlines included.
static VARIANT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([A-Z0-9]+)\s+(.+)$").expect("variant regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub gene: String,
    pub variant: String,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.gene, self.variant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid format. Please use 'Gene Mutation' format (e.g., BRAF V600E).")]
pub struct ParseError;

/// Parse `GENE MUTATION` after trimming surrounding whitespace.
///
/// # Errors
///
/// Returns [`ParseError`] when the input is empty, has no whitespace separator,
/// or the gene token is not uppercase alphanumeric.
pub fn parse_variant(text: &str) -> Result<Variant, ParseError> {
    let caps = VARIANT_REGEX.captures(text.trim()).ok_or(ParseError)?;
    Ok(Variant {
        gene: caps[1].to_owned(),
        variant: caps[2].to_owned(),
    })
}

/// Natural-language retrieval query for a parse result.
///
/// A failed parse yields the error message unchanged.
#[must_use]
pub fn format_query_for_rag(parsed: &Result<Variant, ParseError>) -> String {
    match parsed {
        Ok(v) => format!(
            "What is the clinical significance of the {} {} mutation in precision oncology?",
            v.gene, v.variant
        ),
        Err(e) => e.to_string(),
    }
}
