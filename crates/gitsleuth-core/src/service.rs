//! Repository sessions: background indexing and gated question answering.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use gitsleuth_index::entry::collection_name;
use gitsleuth_index::{
    IndexProgress, Indexer, IndexerConfig, QueryConfig, QueryEngine, QueryResult,
    ProgressSink, RetrievalConfig, Source, WalkSource,
};
use gitsleuth_llm::LlmProvider;
use gitsleuth_memory::{ConversationStore, VectorStore};
use tokio::task::JoinHandle;

use crate::error::{Result, ServiceError};
use crate::session::{Session, SessionRegistry, SessionStatus};

/// Settings for [`RepoService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub indexer: IndexerConfig,
    pub retrieval: RetrievalConfig,
    pub query: QueryConfig,
    /// Larger files are not indexed.
    pub max_file_size: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            indexer: IndexerConfig::default(),
            retrieval: RetrievalConfig::default(),
            query: QueryConfig::default(),
            max_file_size: gitsleuth_index::source::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Handle to a background indexing run.
#[derive(Debug)]
pub struct IndexingTask {
    session_id: String,
    handle: JoinHandle<()>,
    sessions: Arc<SessionRegistry>,
}

impl IndexingTask {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the run to end and return the session's final state.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::SessionNotFound`] if the session was removed
    /// while indexing.
    pub async fn finished(self) -> Result<Session> {
        if let Err(e) = self.handle.await {
            tracing::error!(session_id = %self.session_id, "indexing task aborted: {e}");
            let _ = self
                .sessions
                .mark_failed(&self.session_id, format!("indexing task aborted: {e}"));
        }
        self.sessions.get(&self.session_id)
    }
}

/// Owns the stores, the session registry and the query engine.
///
/// Indexing runs are fire-and-forget: [`RepoService::start_indexing`] returns
/// as soon as the session is registered, and the session's status tells
/// whether it can answer questions yet.
pub struct RepoService<P> {
    store: Arc<dyn VectorStore>,
    indexer: Arc<Indexer<P>>,
    engine: QueryEngine<P>,
    sessions: Arc<SessionRegistry>,
    conversations: Arc<ConversationStore>,
    runs: Mutex<HashMap<String, Arc<IndexProgress>>>,
    max_file_size: u64,
}

impl<P> std::fmt::Debug for RepoService<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoService")
            .field("sessions", &self.sessions)
            .field("max_file_size", &self.max_file_size)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider + 'static> RepoService<P> {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<P>,
        conversations: Arc<ConversationStore>,
        config: ServiceConfig,
    ) -> Self {
        let indexer = Indexer::new(Arc::clone(&store), Arc::clone(&provider), config.indexer);
        let engine = QueryEngine::new(
            Arc::clone(&store),
            provider,
            Arc::clone(&conversations),
            config.retrieval,
            config.query,
        );
        Self {
            store,
            indexer: Arc::new(indexer),
            engine,
            sessions: Arc::new(SessionRegistry::new()),
            conversations,
            runs: Mutex::new(HashMap::new()),
            max_file_size: config.max_file_size,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    #[must_use]
    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Counters of the latest indexing run for `session_id`.
    #[must_use]
    pub fn run_progress(&self, session_id: &str) -> Option<Arc<IndexProgress>> {
        self.runs.lock().ok()?.get(session_id).cloned()
    }

    /// Register a new session for `repo` and index it in the background.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::RepoNotFound`] if `repo` is not a directory.
    pub fn start_indexing(&self, repo: &Path) -> Result<IndexingTask> {
        if !repo.is_dir() {
            return Err(ServiceError::RepoNotFound(repo.to_path_buf()));
        }
        let session = self.sessions.create(&repo.display().to_string())?;
        Ok(self.spawn_run(session.id, repo))
    }

    /// Reset `session_id` and index `repo` into it again.
    ///
    /// Queries against the session fail with [`ServiceError::SessionNotReady`]
    /// until the new run finishes.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::SessionNotFound`] for an unknown session,
    /// [`ServiceError::SessionNotReady`] while a previous run is still in
    /// flight, or [`ServiceError::RepoNotFound`] if `repo` is not a directory.
    pub fn reindex(&self, session_id: &str, repo: &Path) -> Result<IndexingTask> {
        if !repo.is_dir() {
            return Err(ServiceError::RepoNotFound(repo.to_path_buf()));
        }
        self.sessions.reset(session_id)?;
        Ok(self.spawn_run(session_id.to_owned(), repo))
    }

    fn spawn_run(&self, session_id: String, repo: &Path) -> IndexingTask {
        let progress = Arc::new(IndexProgress::new());
        if let Ok(mut runs) = self.runs.lock() {
            runs.insert(session_id.clone(), Arc::clone(&progress));
        }

        let source: Arc<dyn Source> =
            Arc::new(WalkSource::new(repo).with_max_file_size(self.max_file_size));
        let indexer = Arc::clone(&self.indexer);
        let sessions = Arc::clone(&self.sessions);
        let sink = sessions.sink(&session_id);
        let id = session_id.clone();

        let handle = tokio::spawn(async move {
            let outcome = indexer
                .index_source(source, &id, &progress, Some(&sink as &dyn ProgressSink))
                .await;
            let recorded = match outcome {
                Ok(report) => sessions.mark_ready(&id, report),
                Err(e) => {
                    tracing::error!(session_id = %id, "indexing failed: {e}");
                    sessions.mark_failed(&id, e.to_string())
                }
            };
            if let Err(e) = recorded {
                tracing::warn!(session_id = %id, "could not record indexing outcome: {e}");
            }
        });

        tracing::info!(session_id = %session_id, repo = %repo.display(), "indexing scheduled");
        IndexingTask {
            session_id,
            handle,
            sessions: Arc::clone(&self.sessions),
        }
    }

    /// Answer `question` from a ready session.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::SessionNotFound`] for an unknown session,
    /// [`ServiceError::SessionNotReady`] while it is indexing or after a failed
    /// run, and [`ServiceError::Index`] for retrieval or generation failures.
    pub async fn query(
        &self,
        session_id: &str,
        question: &str,
        conversation_id: Option<&str>,
    ) -> Result<QueryResult> {
        let session = self.sessions.get(session_id)?;
        if session.status != SessionStatus::Ready {
            return Err(ServiceError::SessionNotReady {
                session_id: session_id.to_owned(),
                status: session.status,
            });
        }
        Ok(self
            .engine
            .query(question, session_id, conversation_id)
            .await?)
    }

    /// Drop a session with its collection and conversations.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::SessionNotFound`] for an unknown session or an
    /// index error if the collection cannot be deleted.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions.remove(session_id)?;
        if let Ok(mut runs) = self.runs.lock() {
            runs.remove(session_id);
        }
        self.store
            .delete_collection(&collection_name(session_id))
            .await
            .map_err(gitsleuth_index::IndexError::from)?;
        let removed = self
            .conversations
            .delete_for_session(session_id)
            .map_err(gitsleuth_index::IndexError::from)?;
        tracing::info!(session_id = %session_id, conversations = removed, "session deleted");
        Ok(())
    }
}
