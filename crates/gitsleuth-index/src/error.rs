//! Error types for gitsleuth-index.

/// Errors raised by indexing and querying.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The repository could not be enumerated.
    #[error("source enumeration failed: {0}")]
    Source(String),

    #[error("vector store error: {0}")]
    VectorStore(#[from] gitsleuth_memory::VectorStoreError),

    #[error("memory error: {0}")]
    Memory(#[from] gitsleuth_memory::MemoryError),

    /// No collection exists for the session.
    #[error("session {session_id} is not indexed")]
    NotIndexed { session_id: String },

    /// Embedding a document or question failed.
    #[error("embedding failed: {0}")]
    Embedding(#[source] gitsleuth_llm::LlmError),

    /// The generation backend failed to answer.
    #[error("generation failed: {0}")]
    Generation(#[source] gitsleuth_llm::LlmError),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// A blocking task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// Map a memory-layer error, surfacing unknown conversations as their own variant.
    #[must_use]
    pub fn from_memory(err: gitsleuth_memory::MemoryError) -> Self {
        match err {
            gitsleuth_memory::MemoryError::ConversationNotFound(id) => {
                Self::ConversationNotFound(id)
            }
            other => Self::Memory(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_indexed_display() {
        let err = IndexError::NotIndexed {
            session_id: "abc".into(),
        };
        assert_eq!(err.to_string(), "session abc is not indexed");
    }

    #[test]
    fn memory_not_found_maps_to_conversation_not_found() {
        let err = IndexError::from_memory(gitsleuth_memory::MemoryError::ConversationNotFound(
            "c1".into(),
        ));
        assert!(matches!(err, IndexError::ConversationNotFound(ref id) if id == "c1"));
    }
}
