//! Repository indexing: enumerate → read + chunk → embed → store.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chunker::{Chunk, ChunkerConfig, chunk_document};
use crate::entry::{chunk_payload, collection_name, entry_id};
use crate::error::{IndexError, Result};
use crate::progress::{IndexPhase, IndexProgress, ProgressEvent, ProgressSink};
use crate::source::{Source, SourceFile, WalkSource};
use gitsleuth_llm::LlmProvider;
use gitsleuth_memory::{VectorPoint, VectorStore};

/// Upper bound on read + chunk workers.
const MAX_WORKERS: usize = 8;

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
    /// Concurrent file read + chunk tasks (default: available parallelism, at most 8).
    pub workers: usize,
    /// Chunks per embedding request (default: 256).
    pub batch_size: usize,
    /// Embedding batches in flight at once (default: 2).
    pub embed_concurrency: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            workers: default_workers(),
            batch_size: 256,
            embed_concurrency: 2,
        }
    }
}

/// Available parallelism, capped at 8.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map_or(1, std::num::NonZeroUsize::get)
        .min(MAX_WORKERS)
}

/// Summary of an indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct IndexReport {
    pub files_discovered: usize,
    pub files_chunked: usize,
    /// Binary files, detected by a NUL byte.
    pub files_skipped: usize,
    pub files_failed: usize,
    pub chunks_created: usize,
    pub chunks_indexed: usize,
    pub batches_failed: usize,
    pub duration_ms: u64,
}

impl IndexReport {
    /// Chunks actually written to the store.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks_indexed
    }

    /// Whether some batches were lost.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.batches_failed > 0
    }
}

enum FileOutcome {
    Chunks(Vec<Chunk>),
    Binary,
}

/// Builds per-session collections of embedded chunks.
pub struct Indexer<P> {
    store: Arc<dyn VectorStore>,
    provider: Arc<P>,
    config: IndexerConfig,
}

impl<P> std::fmt::Debug for Indexer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider + 'static> Indexer<P> {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, provider: Arc<P>, config: IndexerConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Index a local directory into the session's collection, replacing any previous contents.
    ///
    /// # Errors
    ///
    /// See [`Indexer::index_source`].
    pub async fn create_index(&self, repo_root: &Path, session_id: &str) -> Result<IndexReport> {
        let source = Arc::new(WalkSource::new(repo_root));
        self.index_source(source, session_id, &IndexProgress::new(), None)
            .await
    }

    /// Index every file `source` yields.
    ///
    /// Failed file reads and failed batches are logged and counted in the
    /// report; they never abort the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be enumerated, the embedding
    /// dimension probe fails or the collection cannot be reset. The previous
    /// collection is left untouched when enumeration fails.
    pub async fn index_source(
        &self,
        source: Arc<dyn Source>,
        session_id: &str,
        progress: &IndexProgress,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<IndexReport> {
        let start = Instant::now();
        let mut report = IndexReport::default();
        let collection = collection_name(session_id);
        let emit = |phase: IndexPhase, message: String| {
            if let Some(sink) = sink {
                let percent = match phase {
                    IndexPhase::Discovering => 5,
                    IndexPhase::Done => 100,
                    _ => progress.snapshot().percent(),
                };
                sink.report(ProgressEvent {
                    phase,
                    percent,
                    message,
                });
            }
        };

        tracing::info!(session_id = %session_id, collection = %collection, "indexing started");
        emit(IndexPhase::Discovering, "enumerating files".into());

        let files = tokio::task::spawn_blocking(move || source.files()).await??;

        let probe = self
            .provider
            .embed("dimension probe")
            .await
            .map_err(IndexError::Embedding)?;
        let vector_size = u64::try_from(probe.len()).map_err(|e| IndexError::Other(e.to_string()))?;
        self.store.reset_collection(&collection, vector_size).await?;

        report.files_discovered = files.len();
        progress.set_files_total(files.len());
        emit(
            IndexPhase::Chunking,
            format!("chunking {} files", files.len()),
        );

        let mut chunks = self.chunk_files(files, progress, &mut report).await;
        chunks.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        report.chunks_created = chunks.len();
        progress.set_chunks_total(chunks.len());
        emit(
            IndexPhase::Embedding,
            format!("embedding {} chunks", chunks.len()),
        );

        self.store_batches(session_id, &collection, chunks, progress, &mut report)
            .await;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        if report.is_partial() {
            tracing::warn!(
                session_id = %session_id,
                batches_failed = report.batches_failed,
                "indexing finished with failed batches"
            );
        }
        tracing::info!(
            session_id = %session_id,
            files = report.files_chunked,
            chunks = report.chunks_indexed,
            duration_ms = report.duration_ms,
            "indexing finished"
        );
        emit(
            IndexPhase::Done,
            format!("indexed {} chunks", report.chunks_indexed),
        );
        Ok(report)
    }

    async fn chunk_files(
        &self,
        files: Vec<SourceFile>,
        progress: &IndexProgress,
        report: &mut IndexReport,
    ) -> Vec<Chunk> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut join_set = JoinSet::new();

        for file in files {
            let sem = Arc::clone(&semaphore);
            let chunker = self.config.chunker;
            join_set.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return (file.rel_path, Err(IndexError::Other("worker pool closed".into())));
                };
                let outcome = read_and_chunk(&file, &chunker).await;
                (file.rel_path, outcome)
            });
        }

        let mut chunks = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            progress.file_done();
            let Ok((rel_path, outcome)) = joined else {
                tracing::warn!("chunking task panicked");
                report.files_failed += 1;
                continue;
            };
            match outcome {
                Ok(FileOutcome::Chunks(file_chunks)) => {
                    tracing::debug!(file = %rel_path, chunks = file_chunks.len(), "file chunked");
                    report.files_chunked += 1;
                    chunks.extend(file_chunks);
                }
                Ok(FileOutcome::Binary) => {
                    tracing::debug!(file = %rel_path, "skipping binary file");
                    report.files_skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(file = %rel_path, "failed to read file: {e}");
                    report.files_failed += 1;
                }
            }
        }
        chunks
    }

    async fn store_batches(
        &self,
        session_id: &str,
        collection: &str,
        chunks: Vec<Chunk>,
        progress: &IndexProgress,
        report: &mut IndexReport,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.embed_concurrency.max(1)));
        let mut join_set = JoinSet::new();
        let batch_size = self.config.batch_size.max(1);

        let mut pending = chunks.into_iter().peekable();
        let mut batch_no = 0usize;
        while pending.peek().is_some() {
            let batch: Vec<Chunk> = pending.by_ref().take(batch_size).collect();
            let sem = Arc::clone(&semaphore);
            let provider = Arc::clone(&self.provider);
            let store = Arc::clone(&self.store);
            let session_id = session_id.to_owned();
            let collection = collection.to_owned();
            join_set.spawn(async move {
                let size = batch.len();
                let Ok(_permit) = sem.acquire_owned().await else {
                    return (batch_no, size, Err(IndexError::Other("embedding gate closed".into())));
                };
                let result =
                    embed_and_store(&*provider, &*store, &session_id, &collection, batch).await;
                (batch_no, size, result)
            });
            batch_no += 1;
        }

        while let Some(joined) = join_set.join_next().await {
            let Ok((batch, size, result)) = joined else {
                tracing::warn!("embedding task panicked");
                report.batches_failed += 1;
                continue;
            };
            match result {
                Ok(stored) => {
                    tracing::info!(session_id = %session_id, batch, chunks = stored, "batch stored");
                    report.chunks_indexed += stored;
                    progress.chunks_embedded(stored);
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, batch, chunks = size, "batch failed: {e}");
                    report.batches_failed += 1;
                }
            }
        }
    }
}

async fn read_and_chunk(file: &SourceFile, config: &ChunkerConfig) -> Result<FileOutcome> {
    let bytes = tokio::fs::read(&file.abs_path).await?;
    let Some(content) = decode_source(&bytes) else {
        return Ok(FileOutcome::Binary);
    };
    Ok(FileOutcome::Chunks(chunk_document(
        &content,
        &file.rel_path,
        &file.extension(),
        config,
    )))
}

/// UTF-8 with a Latin-1 fallback; `None` for binary content.
pub(crate) fn decode_source(bytes: &[u8]) -> Option<String> {
    if bytes.contains(&0) {
        return None;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text.to_owned()),
        Err(_) => Some(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Text sent to the embedding model for a chunk.
pub(crate) fn embedding_text(chunk: &Chunk) -> String {
    let mut text = String::with_capacity(chunk.content.len() + chunk.file_path.len() + 32);
    text.push_str("# ");
    text.push_str(&chunk.file_path);
    text.push_str("\n# Language: ");
    text.push_str(chunk.language.id());
    text.push('\n');
    text.push_str(&chunk.content);
    text
}

async fn embed_and_store<P: LlmProvider>(
    provider: &P,
    store: &dyn VectorStore,
    session_id: &str,
    collection: &str,
    batch: Vec<Chunk>,
) -> Result<usize> {
    let texts: Vec<String> = batch.iter().map(embedding_text).collect();
    let vectors = provider
        .embed_batch(&texts)
        .await
        .map_err(IndexError::Embedding)?;
    if vectors.len() != batch.len() {
        return Err(IndexError::Embedding(
            gitsleuth_llm::LlmError::EmbeddingCountMismatch {
                expected: batch.len(),
                actual: vectors.len(),
            },
        ));
    }

    let points: Vec<VectorPoint> = batch
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| VectorPoint {
            id: entry_id(session_id, &chunk.file_path, chunk.chunk_id),
            vector,
            payload: chunk_payload(session_id, chunk),
        })
        .collect();
    let stored = points.len();
    store.upsert(collection, points).await?;
    Ok(stored)
}
