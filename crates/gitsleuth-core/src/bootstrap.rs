//! Application bootstrap: config resolution, provider and vector store construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use gitsleuth_index::{ChunkerConfig, IndexerConfig, QueryConfig, RetrievalConfig};
use gitsleuth_llm::any::AnyProvider;
use gitsleuth_llm::openai::OpenAiProvider;
use gitsleuth_memory::{ConversationStore, InMemoryVectorStore, QdrantOps, VectorStore};

use crate::config::{Config, ProviderKind, VectorBackend};
use crate::service::{RepoService, ServiceConfig};

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Resolve the config path, load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be parsed or fails validation.
    pub fn from_env(cli_config: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = resolve_config_path(cli_config);
        let config = Config::load(&config_path)?;
        config.validate()?;
        tracing::info!(
            config = %config_path.display(),
            provider = %config.llm.provider,
            vector_store = %config.vector_store.backend,
            "configuration loaded"
        );
        Ok(Self {
            config,
            config_path,
        })
    }

    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            config_path: PathBuf::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// # Errors
    ///
    /// See [`create_provider`] and [`create_vector_store`].
    pub fn build_service(&self) -> anyhow::Result<RepoService<AnyProvider>> {
        let provider = create_provider(&self.config)?;
        let store = create_vector_store(&self.config)?;
        let conversations = Arc::new(ConversationStore::new(
            self.config.conversation.max_messages,
        ));
        Ok(RepoService::new(
            store,
            Arc::new(provider),
            conversations,
            service_config(&self.config),
        ))
    }
}

/// Priority: `--config` argument > `GITSLEUTH_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli_config: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_config {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("GITSLEUTH_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// # Errors
///
/// Returns an error if the selected provider is missing its API key or was
/// not compiled in.
pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        ProviderKind::OpenAi => {
            let api_key = config
                .secrets
                .openai_api_key
                .as_ref()
                .context("GITSLEUTH_OPENAI_API_KEY or OPENAI_API_KEY not set")?;
            let provider = OpenAiProvider::new(
                api_key.expose().to_owned(),
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.max_tokens,
                Some(config.llm.embedding_model.clone()),
            )
            .with_temperature(config.llm.temperature);
            Ok(AnyProvider::OpenAi(provider))
        }
        #[cfg(any(test, feature = "mock"))]
        ProviderKind::Mock => Ok(AnyProvider::Mock(
            gitsleuth_llm::mock::MockProvider::default(),
        )),
        #[cfg(not(any(test, feature = "mock")))]
        ProviderKind::Mock => bail!("mock provider requires the `mock` feature"),
    }
}

/// # Errors
///
/// Returns an error if the Qdrant client cannot be created.
pub fn create_vector_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.vector_store.backend {
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        VectorBackend::Qdrant => {
            let url = &config.vector_store.qdrant_url;
            if url.is_empty() {
                bail!("vector_store.qdrant_url must be set for the qdrant backend");
            }
            let ops = QdrantOps::new(url)
                .with_context(|| format!("failed to create Qdrant client for {url}"))?;
            Ok(Arc::new(ops))
        }
    }
}

#[must_use]
pub fn indexer_config(config: &Config) -> IndexerConfig {
    IndexerConfig {
        chunker: ChunkerConfig {
            min_chunk_chars: config.index.min_chunk_chars,
            fallback_window_lines: config.index.fallback_window_lines,
            max_chunk_lines: config.index.max_chunk_lines,
            ..ChunkerConfig::default()
        },
        workers: config.index.workers,
        batch_size: config.index.batch_size,
        embed_concurrency: config.index.embed_concurrency,
    }
}

#[must_use]
pub fn retrieval_config(config: &Config) -> RetrievalConfig {
    RetrievalConfig {
        top_k: config.retrieval.top_k,
        max_distance: config.retrieval.max_distance,
    }
}

#[must_use]
pub fn query_config(config: &Config) -> QueryConfig {
    QueryConfig {
        history_tokens: config.retrieval.history_tokens,
        snippet_chars: config.retrieval.snippet_chars,
    }
}

#[must_use]
pub fn service_config(config: &Config) -> ServiceConfig {
    ServiceConfig {
        indexer: indexer_config(config),
        retrieval: retrieval_config(config),
        query: query_config(config),
        max_file_size: config.index.max_file_size,
    }
}

#[cfg(test)]
mod tests {
    use gitsleuth_llm::LlmProvider;
    use serial_test::serial;

    use super::*;
    use crate::config::Secret;

    #[test]
    fn openai_provider_needs_key() {
        let config = Config::default();
        let err = create_provider(&config).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let mut config = Config::default();
        config.secrets.openai_api_key = Some(Secret::new("sk-test"));
        let provider = create_provider(&config).unwrap();
        assert!(matches!(provider, AnyProvider::OpenAi(_)));
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn mock_provider() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::Mock;
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn qdrant_backend_without_url_errors() {
        let mut config = Config::default();
        config.vector_store.backend = VectorBackend::Qdrant;
        config.vector_store.qdrant_url = String::new();
        let err = create_vector_store(&config).err().unwrap();
        assert!(err.to_string().contains("qdrant_url"));
    }

    #[tokio::test]
    async fn memory_backend_starts_empty() {
        let store = create_vector_store(&Config::default()).unwrap();
        assert!(!store.collection_exists("repo_any").await.unwrap());
    }

    #[test]
    fn config_maps_onto_components() {
        let mut config = Config::default();
        config.index.workers = 3;
        config.index.batch_size = 16;
        config.index.min_chunk_chars = 20;
        config.retrieval.top_k = 9;
        config.retrieval.max_distance = Some(0.7);
        config.retrieval.history_tokens = 500;

        let service = service_config(&config);
        assert_eq!(service.indexer.workers, 3);
        assert_eq!(service.indexer.batch_size, 16);
        assert_eq!(service.indexer.chunker.min_chunk_chars, 20);
        assert_eq!(
            service.indexer.chunker.min_content_chars,
            ChunkerConfig::default().min_content_chars
        );
        assert_eq!(service.retrieval.top_k, 9);
        assert_eq!(service.retrieval.max_distance, Some(0.7));
        assert_eq!(service.query.history_tokens, 500);
        assert_eq!(service.max_file_size, 1024 * 1024);
    }

    #[test]
    #[serial]
    fn config_path_priority() {
        unsafe { std::env::remove_var("GITSLEUTH_CONFIG") };
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("config/default.toml")
        );

        unsafe { std::env::set_var("GITSLEUTH_CONFIG", "/etc/gitsleuth.toml") };
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("/etc/gitsleuth.toml")
        );
        assert_eq!(
            resolve_config_path(Some(Path::new("local.toml"))),
            PathBuf::from("local.toml")
        );
        unsafe { std::env::remove_var("GITSLEUTH_CONFIG") };
    }

    #[tokio::test]
    async fn builder_wires_a_working_service() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::Mock;
        let builder = AppBuilder::with_config(config);
        let service = builder.build_service().unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("lib.rs"),
            "pub fn add(left: u64, right: u64) -> u64 {\n    left + right\n}\n",
        )
        .unwrap();
        let session = service
            .start_indexing(dir.path())
            .unwrap()
            .finished()
            .await
            .unwrap();
        let result = service
            .query(&session.id, "what does add in lib.rs do?", None)
            .await
            .unwrap();
        assert_eq!(result.sources[0].file, "lib.rs");
    }
}
