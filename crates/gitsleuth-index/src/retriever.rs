//! Question → ranked chunks: nearest-neighbour search, filename boosting, reranking.

use std::path::Path;
use std::sync::Arc;

use crate::chunker::Chunk;
use crate::entry::{chunk_from_payload, collection_name};
use crate::error::{IndexError, Result};
use gitsleuth_llm::LlmProvider;
use gitsleuth_memory::{VectorStore, VectorStoreError};

/// Retrieval configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    /// Nearest chunks fetched per question (default: 5).
    pub top_k: usize,
    /// Drop candidates farther than this. Off by default.
    pub max_distance: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_distance: None,
        }
    }
}

/// A chunk with its distance to the question (0 = identical direction).
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Outcome of one retrieval.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// Ranked chunks after boosting, reranking and the distance cutoff.
    pub chunks: Vec<RetrievedChunk>,
    /// Distances of every candidate before the cutoff, in store order.
    pub raw_distances: Vec<f32>,
    /// Path of the candidate promoted by a filename match.
    pub boosted: Option<String>,
}

/// Embeds questions and ranks chunks from a session's collection.
pub struct Retriever<P> {
    store: Arc<dyn VectorStore>,
    provider: Arc<P>,
    config: RetrievalConfig,
}

impl<P> std::fmt::Debug for Retriever<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> Retriever<P> {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, provider: Arc<P>, config: RetrievalConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Retrieve the configured number of chunks for `question`.
    ///
    /// # Errors
    ///
    /// See [`Retriever::retrieve_k`].
    pub async fn retrieve(&self, question: &str, session_id: &str) -> Result<Retrieval> {
        self.retrieve_k(question, session_id, self.config.top_k)
            .await
    }

    /// Retrieve up to `k` chunks for `question`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotIndexed`] if the session has no collection or
    /// its collection is empty,
    /// [`IndexError::Embedding`] if the question cannot be embedded, or a
    /// vector store error if the search fails.
    pub async fn retrieve_k(&self, question: &str, session_id: &str, k: usize) -> Result<Retrieval> {
        let collection = collection_name(session_id);
        let not_indexed = || IndexError::NotIndexed {
            session_id: session_id.to_owned(),
        };
        if !self.store.collection_exists(&collection).await?
            || self.store.count(&collection).await? == 0
        {
            return Err(not_indexed());
        }

        let vector = self
            .provider
            .embed(question)
            .await
            .map_err(IndexError::Embedding)?;
        let limit = u64::try_from(k).unwrap_or(u64::MAX);
        let hits = match self.store.search(&collection, vector, limit).await {
            Ok(hits) => hits,
            Err(VectorStoreError::MissingCollection(_)) => return Err(not_indexed()),
            Err(e) => return Err(e.into()),
        };

        let candidates: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter_map(|hit| {
                let chunk = chunk_from_payload(&hit.payload);
                if chunk.is_none() {
                    tracing::warn!(id = %hit.id, "stored point has no chunk payload");
                }
                chunk.map(|chunk| RetrievedChunk {
                    chunk,
                    distance: 1.0 - hit.score,
                })
            })
            .collect();
        let raw_distances: Vec<f32> = candidates.iter().map(|c| c.distance).collect();

        let (mut chunks, boosted) = boost_and_rerank(question, candidates);
        let boosted = boosted.then(|| chunks[0].chunk.file_path.clone());
        if let Some(path) = &boosted {
            tracing::info!(session_id = %session_id, file = %path, "boosted file named in question");
        }

        if let Some(max) = self.config.max_distance {
            let keep_from = usize::from(boosted.is_some());
            let mut idx = 0;
            chunks.retain(|c| {
                let keep = idx < keep_from || c.distance <= max;
                idx += 1;
                keep
            });
        }

        tracing::debug!(
            session_id = %session_id,
            candidates = raw_distances.len(),
            kept = chunks.len(),
            "retrieval finished"
        );
        Ok(Retrieval {
            chunks,
            raw_distances,
            boosted,
        })
    }
}

/// Names under which a question may refer to a file: file name, full path,
/// and file name without extension, all lowercased.
fn file_aliases(file_path: &str) -> [String; 3] {
    let path = Path::new(file_path);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path)
        .to_lowercase();
    let stem = path
        .file_stem()
        .and_then(|n| n.to_str())
        .map_or_else(|| name.clone(), str::to_lowercase);
    [name, file_path.to_lowercase(), stem]
}

/// Promote the first candidate whose file the question names, then order the
/// rest by ascending distance. Returns whether a candidate was promoted.
#[must_use]
pub fn boost_and_rerank(
    question: &str,
    mut candidates: Vec<RetrievedChunk>,
) -> (Vec<RetrievedChunk>, bool) {
    let question = question.to_lowercase();
    let named = candidates.iter().position(|c| {
        file_aliases(&c.chunk.file_path)
            .iter()
            .any(|alias| !alias.is_empty() && question.contains(alias.as_str()))
    });

    let boosted = named.map(|idx| candidates.remove(idx));
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    match boosted {
        Some(first) => {
            candidates.insert(0, first);
            (candidates, true)
        }
        None => (candidates, false),
    }
}

#[cfg(test)]
mod tests {
    use gitsleuth_llm::mock::MockProvider;
    use gitsleuth_memory::{InMemoryVectorStore, VectorPoint};

    use super::*;
    use crate::entry::{chunk_payload, entry_id};
    use crate::languages::Lang;
    use crate::scanner::ChunkKind;

    fn candidate(path: &str, distance: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                content: format!("content of {path}"),
                file_path: path.into(),
                start_line: 1,
                end_line: 2,
                kind: ChunkKind::Function,
                language: Lang::Rust,
                is_semantic: true,
                chunk_id: 0,
                chunk_size: 0,
            },
            distance,
        }
    }

    fn paths(chunks: &[RetrievedChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.chunk.file_path.as_str()).collect()
    }

    #[test]
    fn rerank_orders_by_distance() {
        let (ranked, boosted) = boost_and_rerank(
            "how is data stored?",
            vec![
                candidate("alpha.rs", 0.4),
                candidate("beta.rs", 0.1),
                candidate("gamma.rs", 0.3),
            ],
        );
        assert!(!boosted);
        assert_eq!(paths(&ranked), vec!["beta.rs", "gamma.rs", "alpha.rs"]);
    }

    #[test]
    fn named_file_goes_first() {
        let (ranked, boosted) = boost_and_rerank(
            "What does Parser.rs do?",
            vec![
                candidate("src/lexer.rs", 0.1),
                candidate("src/parser.rs", 0.9),
                candidate("src/ast.rs", 0.2),
            ],
        );
        assert!(boosted);
        assert_eq!(paths(&ranked), vec!["src/parser.rs", "src/lexer.rs", "src/ast.rs"]);
    }

    #[test]
    fn stem_and_full_path_match() {
        let (ranked, _) = boost_and_rerank(
            "explain the config module",
            vec![candidate("alpha.rs", 0.1), candidate("src/config.rs", 0.5)],
        );
        assert_eq!(ranked[0].chunk.file_path, "src/config.rs");

        let (ranked, _) = boost_and_rerank(
            "look at web/index.html please",
            vec![candidate("alpha.rs", 0.1), candidate("web/index.html", 0.5)],
        );
        assert_eq!(ranked[0].chunk.file_path, "web/index.html");
    }

    #[test]
    fn only_first_match_is_boosted() {
        let (ranked, _) = boost_and_rerank(
            "compare main and util",
            vec![
                candidate("x.rs", 0.05),
                candidate("util.rs", 0.6),
                candidate("main.rs", 0.3),
            ],
        );
        assert_eq!(paths(&ranked), vec!["util.rs", "x.rs", "main.rs"]);
    }

    #[test]
    fn equal_distances_keep_store_order() {
        let (ranked, _) = boost_and_rerank(
            "anything",
            vec![candidate("one.rs", 0.2), candidate("two.rs", 0.2), candidate("three.rs", 0.1)],
        );
        assert_eq!(paths(&ranked), vec!["three.rs", "one.rs", "two.rs"]);
    }

    async fn seeded_store(provider: &MockProvider) -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .ensure_collection("repo_s1", gitsleuth_llm::mock::MOCK_DIMENSIONS as u64)
            .await
            .unwrap();
        let mut points = Vec::new();
        for (path, text) in [
            ("src/auth.rs", "fn login user password session token"),
            ("src/db.rs", "fn query database rows connection pool"),
        ] {
            let mut c = candidate(path, 0.0).chunk;
            c.content = text.into();
            points.push(VectorPoint {
                id: entry_id("s1", path, 0),
                vector: provider.embed(text).await.unwrap(),
                payload: chunk_payload("s1", &c),
            });
        }
        store.upsert("repo_s1", points).await.unwrap();
        store
    }

    #[tokio::test]
    async fn unindexed_session_fails_fast() {
        let provider = Arc::new(MockProvider::default());
        let retriever = Retriever::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::clone(&provider),
            RetrievalConfig::default(),
        );
        let err = retriever.retrieve("anything", "nope").await.unwrap_err();
        assert!(matches!(err, IndexError::NotIndexed { ref session_id } if session_id == "nope"));
        assert_eq!(provider.embed_calls(), 0);
    }

    #[tokio::test]
    async fn empty_collection_counts_as_unindexed() {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .reset_collection("repo_s1", gitsleuth_llm::mock::MOCK_DIMENSIONS as u64)
            .await
            .unwrap();
        let retriever = Retriever::new(store, Arc::clone(&provider), RetrievalConfig::default());
        let err = retriever.retrieve("anything", "s1").await.unwrap_err();
        assert!(matches!(err, IndexError::NotIndexed { .. }));
        assert_eq!(provider.embed_calls(), 0);
    }

    #[tokio::test]
    async fn retrieves_nearest_chunk_first() {
        let provider = MockProvider::default();
        let store = seeded_store(&provider).await;
        let retriever = Retriever::new(store, Arc::new(provider), RetrievalConfig::default());

        let result = retriever
            .retrieve("how does the user login with a password", "s1")
            .await
            .unwrap();
        assert_eq!(result.chunks.len(), 2);
        assert_eq!(result.chunks[0].chunk.file_path, "src/auth.rs");
        assert!(result.chunks[0].distance < result.chunks[1].distance);
        assert_eq!(result.raw_distances.len(), 2);
        assert!(result.boosted.is_none());
    }

    #[tokio::test]
    async fn distance_cutoff_keeps_raw_distances() {
        let provider = MockProvider::default();
        let store = seeded_store(&provider).await;
        let retriever = Retriever::new(
            store,
            Arc::new(provider),
            RetrievalConfig {
                top_k: 5,
                max_distance: Some(0.0),
            },
        );
        let result = retriever.retrieve("unrelated words", "s1").await.unwrap();
        assert!(result.chunks.is_empty());
        assert_eq!(result.raw_distances.len(), 2);
    }

    #[tokio::test]
    async fn boosted_file_survives_cutoff() {
        let provider = MockProvider::default();
        let store = seeded_store(&provider).await;
        let retriever = Retriever::new(
            store,
            Arc::new(provider),
            RetrievalConfig {
                top_k: 5,
                max_distance: Some(0.0),
            },
        );
        let result = retriever.retrieve("what is in db.rs", "s1").await.unwrap();
        assert_eq!(result.boosted.as_deref(), Some("src/db.rs"));
        assert_eq!(result.chunks.len(), 1);
    }
}
