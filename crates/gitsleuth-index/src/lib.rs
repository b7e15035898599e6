//! Code chunking, repository indexing and retrieval-augmented question answering.
//!
//! Source files are split into construct-aligned chunks by per-language
//! line scanners (no parser), embedded in batches and stored per session in a
//! vector store. Questions are embedded, matched against the session's chunks,
//! boosted when they name a file, and answered from a prompt that combines the
//! chunks with bounded conversation history.

pub mod chunker;
pub mod confidence;
pub mod context;
pub mod engine;
pub mod entry;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod progress;
pub mod retriever;
pub mod scanner;
pub mod source;

pub use chunker::{Chunk, ChunkerConfig, chunk_document};
pub use engine::{QueryConfig, QueryEngine, QueryResult, SourceRef};
pub use error::{IndexError, Result};
pub use indexer::{IndexReport, Indexer, IndexerConfig};
pub use languages::Lang;
pub use progress::{IndexPhase, IndexProgress, ProgressEvent, ProgressSink};
pub use retriever::{RetrievalConfig, Retrieval, RetrievedChunk, Retriever};
pub use scanner::ChunkKind;
pub use source::{Source, SourceFile, WalkSource};
