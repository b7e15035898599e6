//! Question answering over an indexed session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;
use crate::confidence;
use crate::context::ContextAssembler;
use crate::error::{IndexError, Result};
use crate::retriever::{RetrievalConfig, Retriever};
use gitsleuth_llm::LlmProvider;
use gitsleuth_memory::{Confidence, ConversationStore, Role, VectorStore};

/// Query-path configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    /// Word budget for conversation history in the prompt (default: 2000).
    pub history_tokens: usize,
    /// Characters of chunk content shown per source (default: 200).
    pub snippet_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            history_tokens: 2000,
            snippet_chars: 200,
        }
    }
}

/// A chunk cited in an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub file: String,
    pub snippet: String,
    pub line_number: Option<usize>,
}

/// Answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: Confidence,
    pub conversation_id: String,
}

/// Retrieval, prompting, generation and conversation bookkeeping for questions.
pub struct QueryEngine<P> {
    retriever: Retriever<P>,
    assembler: ContextAssembler,
    conversations: Arc<ConversationStore>,
    provider: Arc<P>,
    config: QueryConfig,
}

impl<P> std::fmt::Debug for QueryEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("retriever", &self.retriever)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> QueryEngine<P> {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<P>,
        conversations: Arc<ConversationStore>,
        retrieval: RetrievalConfig,
        config: QueryConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(store, Arc::clone(&provider), retrieval),
            assembler: ContextAssembler::new(Arc::clone(&conversations)),
            conversations,
            provider,
            config,
        }
    }

    #[must_use]
    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Answer `question` against `session_id`'s index.
    ///
    /// Without a `conversation_id` a new conversation is started. The question
    /// and the answer are both appended to the conversation; the answer carries
    /// a trailing `[CONFIDENCE: …]` tag.
    ///
    /// The question is recorded before generation, so a failed generation
    /// leaves it in the conversation without an assistant reply.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ConversationNotFound`] for an unknown conversation,
    /// [`IndexError::NotIndexed`] if the session has no index or an empty one,
    /// [`IndexError::Embedding`] or [`IndexError::Generation`] if the provider fails.
    pub async fn query(
        &self,
        question: &str,
        session_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<QueryResult> {
        if let Some(id) = conversation_id
            && !self.conversations.contains(id)
        {
            return Err(IndexError::ConversationNotFound(id.to_owned()));
        }

        let retrieval = self.retriever.retrieve(question, session_id).await?;

        let conversation_id = match conversation_id {
            Some(id) => id.to_owned(),
            None => self
                .conversations
                .create(session_id)
                .map_err(IndexError::from_memory)?,
        };
        self.conversations
            .append(&conversation_id, Role::User, question, None)
            .map_err(IndexError::from_memory)?;

        let context = self.assembler.assemble(
            retrieval.chunks.iter().map(|r| &r.chunk),
            &conversation_id,
            self.config.history_tokens,
        )?;
        let messages = context.into_messages(question);

        let response = self
            .provider
            .chat(&messages)
            .await
            .map_err(IndexError::Generation)?;
        let answer = response.trim();

        let confidence =
            confidence::estimate(answer, &retrieval.raw_distances, retrieval.raw_distances.len());
        let answer = if Confidence::from_marker(answer).is_some() {
            answer.to_owned()
        } else {
            format!("{answer}\n\n[CONFIDENCE: {confidence}]")
        };
        self.conversations
            .append(
                &conversation_id,
                Role::Assistant,
                answer.clone(),
                Some(confidence),
            )
            .map_err(IndexError::from_memory)?;

        let sources = retrieval
            .chunks
            .iter()
            .map(|r| source_ref(&r.chunk, self.config.snippet_chars))
            .collect();

        tracing::info!(
            session_id = %session_id,
            conversation_id = %conversation_id,
            sources = retrieval.chunks.len(),
            confidence = %confidence,
            "question answered"
        );
        Ok(QueryResult {
            answer,
            sources,
            confidence,
            conversation_id,
        })
    }
}

fn source_ref(chunk: &Chunk, snippet_chars: usize) -> SourceRef {
    let mut snippet: String = chunk.content.chars().take(snippet_chars).collect();
    if chunk.content.chars().nth(snippet_chars).is_some() {
        snippet.push_str("...");
    }
    SourceRef {
        file: chunk.file_path.clone(),
        snippet,
        line_number: (chunk.start_line > 0).then_some(chunk.start_line),
    }
}

#[cfg(test)]
mod tests {
    use gitsleuth_llm::mock::MockProvider;
    use gitsleuth_memory::InMemoryVectorStore;

    use super::*;
    use crate::entry::collection_name;
    use crate::indexer::{Indexer, IndexerConfig};
    use crate::languages::Lang;
    use crate::scanner::ChunkKind;

    async fn indexed_engine(provider: MockProvider) -> (QueryEngine<MockProvider>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cache.rs"),
            "pub fn evict_expired(entries: &mut Vec<Entry>) {\n    entries.retain(|e| !e.expired());\n}\n",
        )
        .unwrap();
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let provider = Arc::new(provider);
        Indexer::new(Arc::clone(&store), Arc::clone(&provider), IndexerConfig::default())
            .create_index(dir.path(), "s1")
            .await
            .unwrap();
        let engine = QueryEngine::new(
            store,
            provider,
            Arc::new(ConversationStore::default()),
            RetrievalConfig::default(),
            QueryConfig::default(),
        );
        (engine, dir)
    }

    #[test]
    fn snippet_is_truncated_with_ellipsis() {
        let chunk = Chunk {
            content: "x".repeat(250),
            file_path: "a.rs".into(),
            start_line: 4,
            end_line: 9,
            kind: ChunkKind::Function,
            language: Lang::Rust,
            is_semantic: true,
            chunk_id: 0,
            chunk_size: 250,
        };
        let source = source_ref(&chunk, 200);
        assert_eq!(source.snippet.len(), 203);
        assert!(source.snippet.ends_with("..."));
        assert_eq!(source.line_number, Some(4));

        let short = Chunk {
            content: "short".into(),
            ..chunk
        };
        assert_eq!(source_ref(&short, 200).snippet, "short");
    }

    #[tokio::test]
    async fn answers_and_records_conversation() {
        let (engine, _dir) =
            indexed_engine(MockProvider::with_responses(vec!["It evicts entries.".into()])).await;
        let result = engine
            .query("what does evict_expired do?", "s1", None)
            .await
            .unwrap();

        assert!(result.answer.starts_with("It evicts entries."));
        assert!(result.answer.ends_with(&format!("[CONFIDENCE: {}]", result.confidence)));
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].file, "cache.rs");
        assert_eq!(result.sources[0].line_number, Some(1));

        let stats = engine.conversations().stats(&result.conversation_id).unwrap();
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.assistant_messages, 1);
        let history = engine.conversations().get(&result.conversation_id).unwrap();
        assert_eq!(history.messages[1].confidence, Some(result.confidence));
    }

    #[tokio::test]
    async fn prompt_contains_context_history_and_question() {
        let provider = MockProvider::default();
        let (engine, _dir) = indexed_engine(provider.clone()).await;
        let first = engine.query("first question", "s1", None).await.unwrap();
        engine
            .query("second question", "s1", Some(&first.conversation_id))
            .await
            .unwrap();

        let messages = provider.last_messages();
        assert_eq!(messages.len(), 2);
        let user = &messages[1].content;
        assert!(user.starts_with("Context:\nFile: cache.rs (lines 1-3)\n"));
        assert!(user.contains("Conversation:\nuser: first question\nassistant: mock response"));
        assert!(user.ends_with("user: second question\n\nQuestion: second question"));
    }

    #[tokio::test]
    async fn marker_in_answer_is_kept() {
        let (engine, _dir) = indexed_engine(MockProvider::with_responses(vec![
            "Probably a cache. [CONFIDENCE: low]".into(),
        ]))
        .await;
        let result = engine.query("what is this", "s1", None).await.unwrap();
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.answer, "Probably a cache. [CONFIDENCE: low]");
    }

    #[tokio::test]
    async fn unindexed_session_creates_no_conversation() {
        let (engine, _dir) = indexed_engine(MockProvider::default()).await;
        let err = engine.query("q", "other", None).await.unwrap_err();
        assert!(matches!(err, IndexError::NotIndexed { .. }));
    }

    #[tokio::test]
    async fn reset_collection_is_not_answered() {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .reset_collection(
                &collection_name("s1"),
                gitsleuth_llm::mock::MOCK_DIMENSIONS as u64,
            )
            .await
            .unwrap();
        let provider = Arc::new(MockProvider::with_responses(vec!["Fabricated answer.".into()]));
        let conversations = Arc::new(ConversationStore::default());
        let engine = QueryEngine::new(
            store,
            Arc::clone(&provider),
            Arc::clone(&conversations),
            RetrievalConfig::default(),
            QueryConfig::default(),
        );

        let err = engine.query("what does main do", "s1", None).await.unwrap_err();
        assert!(matches!(err, IndexError::NotIndexed { ref session_id } if session_id == "s1"));
        assert!(provider.last_messages().is_empty());
        assert_eq!(conversations.delete_for_session("s1").unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_conversation_is_rejected() {
        let (engine, _dir) = indexed_engine(MockProvider::default()).await;
        let err = engine.query("q", "s1", Some("nope")).await.unwrap_err();
        assert!(matches!(err, IndexError::ConversationNotFound(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn generation_failure_is_distinct() {
        let (engine, _dir) = indexed_engine(MockProvider::failing()).await;
        let err = engine.query("q", "s1", None).await.unwrap_err();
        assert!(matches!(err, IndexError::Generation(_)));
    }
}
