use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "generag", version)]
#[command(about = "Clinical interpretation of genetic variants grounded in ingested literature")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add documents (PDF, text, Markdown) to the literature index
    Ingest {
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },
    /// Generate a clinical report for a variant, e.g. `BRAF V600E`
    Report {
        #[arg(required = true, num_args = 1.., value_name = "VARIANT")]
        variant: Vec<String>,
        /// Number of passages to retrieve (defaults to `retrieval.top_k`)
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },
    /// Show the passages most similar to a free-text query
    Search {
        #[arg(required = true, num_args = 1.., value_name = "QUERY")]
        query: Vec<String>,
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },
    /// Read variants line by line; `:ingest <path>` adds a document
    Interactive,
}

/// Input line in interactive mode.
#[derive(Debug, PartialEq, Eq)]
pub enum InteractiveLine<'a> {
    Skip,
    Quit,
    Ingest(&'a str),
    Variant(&'a str),
}

pub fn classify_line(line: &str) -> InteractiveLine<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InteractiveLine::Skip;
    }
    if trimmed == "exit" || trimmed == "quit" {
        return InteractiveLine::Quit;
    }
    if let Some(rest) = trimmed.strip_prefix(":ingest")
        && (rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
        return InteractiveLine::Ingest(rest.trim());
    }
    InteractiveLine::Variant(trimmed)
}
