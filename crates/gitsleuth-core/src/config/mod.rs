mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to sensible defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
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
        Ok(config)
    }

    /// Reject configurations that cannot run.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.index.workers == 0 {
            bail!("index.workers must be greater than 0");
        }
        if self.index.batch_size == 0 {
            bail!("index.batch_size must be greater than 0");
        }
        if self.index.embed_concurrency == 0 {
            bail!("index.embed_concurrency must be greater than 0");
        }
        if self.index.fallback_window_lines == 0 {
            bail!("index.fallback_window_lines must be greater than 0");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be greater than 0");
        }
        if let Some(max) = self.retrieval.max_distance
            && !(max.is_finite() && max >= 0.0)
        {
            bail!("retrieval.max_distance must be a non-negative number, got {max}");
        }
        if self.conversation.max_messages == 0 {
            bail!("conversation.max_messages must be greater than 0");
        }
        if self.llm.provider == ProviderKind::OpenAi && self.secrets.openai_api_key.is_none() {
            bail!(
                "openai provider requires an API key (set GITSLEUTH_OPENAI_API_KEY or OPENAI_API_KEY)"
            );
        }
        Ok(())
    }
}
