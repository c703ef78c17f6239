mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use generag_memory::document::{SplitterConfig, TextSplitter};

use crate::retriever::RetrieverOptions;
use crate::vault::{Secret, VaultProvider};

/// Vault keys checked for the OpenAI credential, in order.
pub const OPENAI_KEY_NAMES: [&str; 2] = ["GENERAG_OPENAI_API_KEY", "OPENAI_API_KEY"];

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

impl Config {
    /// Load configuration from a TOML file with env var overrides, then validate.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// the resulting values are invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file location: explicit argument, then `GENERAG_CONFIG`, then the default path.
    #[must_use]
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit.map_or_else(
            || {
                std::env::var("GENERAG_CONFIG")
                    .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
            },
            Path::to_path_buf,
        )
    }

    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be at least 1");
        }
        if self.splitter.chunk_size == 0 {
            bail!("splitter.chunk_size must be at least 1");
        }
        if self.splitter.chunk_overlap >= self.splitter.chunk_size {
            bail!(
                "splitter.chunk_overlap ({}) must be smaller than splitter.chunk_size ({})",
                self.splitter.chunk_overlap,
                self.splitter.chunk_size
            );
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be within [0, 2], got {}", self.llm.temperature);
        }
        if self.timeouts.llm_seconds == 0 {
            bail!("timeouts.llm_seconds must be at least 1");
        }
        if self.timeouts.embedding_seconds == 0 {
            bail!("timeouts.embedding_seconds must be at least 1");
        }
        if self.index.name.trim().is_empty() {
            bail!("index.name must not be empty");
        }
        if self.vault.backend != "env" {
            bail!("unsupported vault backend: {}", self.vault.backend);
        }
        Ok(())
    }

    /// Resolve sensitive configuration values through the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        for key in OPENAI_KEY_NAMES {
            if let Some(val) = vault.get_secret(key).await?
                && !val.trim().is_empty()
            {
                self.secrets.openai_api_key = Some(Secret::new(val.trim()));
                break;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn text_splitter(&self) -> TextSplitter {
        TextSplitter::new(SplitterConfig {
            chunk_size: self.splitter.chunk_size,
            chunk_overlap: self.splitter.chunk_overlap,
            ..SplitterConfig::default()
        })
    }

    /// Retriever settings for the configured index, splitter, and embedding model.
    #[must_use]
    pub fn retriever_options(&self) -> RetrieverOptions {
        RetrieverOptions {
            collection: self.index.name.clone(),
            embedding_model: self.llm.embedding_model.clone(),
            splitter: self.text_splitter(),
            ingest_policy: self.index.ingest_policy,
            max_file_size: self.index.max_file_size,
            top_k: self.retrieval.top_k,
            embedding_timeout: self.embedding_timeout(),
        }
    }

    #[must_use]
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.llm_seconds)
    }

    #[must_use]
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.embedding_seconds)
    }
}
