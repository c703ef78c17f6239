mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use generag_core::config::OPENAI_KEY_NAMES;
use generag_core::vault::EnvVaultProvider;
use generag_core::{
    ClinicalReport, Config, ContextRetriever, PipelineError, ReportGenerator, ReportPipeline,
};
use generag_llm::LlmProvider;
use generag_llm::http::build_client;
use generag_llm::openai::OpenAiProvider;
use generag_llm::provider::embed_fn;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::cli::{Cli, Command, InteractiveLine, classify_line};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_subscriber();

    let config_path = Config::resolve_path(cli.config.as_deref());
    let mut config = Config::load(&config_path)?;
    config.resolve_secrets(&EnvVaultProvider).await?;

    let provider = create_provider(&config)?;
    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        index = %config.index.db_path().display(),
        "starting generag"
    );
    let pipeline = build_pipeline(&config, provider);

    match cli.command {
        Command::Ingest { files } => {
            for file in &files {
                let report = pipeline
                    .ingest(file)
                    .await
                    .with_context(|| format!("failed to ingest {}", file.display()))?;
                println!("{report}");
            }
        }
        Command::Report { variant, top_k } => {
            let input = variant.join(" ");
            let k = top_k.unwrap_or(config.retrieval.top_k);
            let report = pipeline.report_k(&input, k).await?;
            println!("{}", format_report(&report));
        }
        Command::Search { query, top_k } => {
            let k = top_k.unwrap_or(config.retrieval.top_k);
            let hits = pipeline.retriever().search_k(&query.join(" "), k).await?;
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.4}] {} #{}\n{}\n",
                    i + 1,
                    hit.score,
                    hit.source,
                    hit.chunk_index,
                    hit.preview(generag_core::pipeline::EVIDENCE_PREVIEW_CHARS)
                );
            }
        }
        Command::Interactive => run_interactive(&pipeline).await?,
    }

    Ok(())
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn create_provider(config: &Config) -> anyhow::Result<OpenAiProvider> {
    let api_key = config.secrets.openai_api_key.as_ref().with_context(|| {
        format!(
            "no OpenAI API key configured; set {}",
            OPENAI_KEY_NAMES.join(" or ")
        )
    })?;
    let client = build_client(config.llm_timeout())?;

    Ok(OpenAiProvider::new(
        api_key.expose().to_owned(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.max_tokens,
        Some(config.llm.embedding_model.clone()),
    )
    .with_client(client)
    .with_temperature(config.llm.temperature)
    .with_max_retries(config.llm.max_retries))
}

fn build_pipeline(config: &Config, provider: OpenAiProvider) -> ReportPipeline<OpenAiProvider> {
    let retriever = ContextRetriever::sqlite(
        config.index.db_path(),
        embed_fn(Arc::new(provider.clone())),
        config.retriever_options(),
    );
    ReportPipeline::new(
        retriever,
        ReportGenerator::new(provider, config.llm_timeout()),
    )
}

fn format_report(report: &ClinicalReport) -> String {
    let mut out = format!("### Analysis for {}\n\n", report.input.trim());
    out.push_str(report.markdown.trim_end());
    out.push_str("\n\n### Evidence from literature\n");
    for (i, preview) in report.evidence_previews() {
        out.push_str(&format!("\nSource {i}: {preview}...\n"));
    }
    out
}

async fn run_interactive<P: LlmProvider>(pipeline: &ReportPipeline<P>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"Variant> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match classify_line(&line) {
            InteractiveLine::Skip => {}
            InteractiveLine::Quit => break,
            InteractiveLine::Ingest("") => println!("Usage: :ingest <path>"),
            InteractiveLine::Ingest(path) => match pipeline.ingest(Path::new(path)).await {
                Ok(report) => println!("{report}"),
                Err(e) => print_error(&e),
            },
            InteractiveLine::Variant(input) => match pipeline.report(input).await {
                Ok(report) => println!("{}", format_report(&report)),
                Err(e) => print_error(&e),
            },
        }
    }
    Ok(())
}

fn print_error(e: &PipelineError) {
    if e.is_user_error() {
        println!("{e}");
    } else {
        tracing::error!("{e:#}");
        println!("Error: {e}");
    }
}
