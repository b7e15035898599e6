//! Vector stores and bounded conversation history.

pub mod confidence;
pub mod conversation;
pub mod error;
pub mod in_memory_store;
pub mod qdrant_ops;
pub mod tokens;
pub mod vector_store;

pub use confidence::Confidence;
pub use conversation::{
    Conversation, ConversationMessage, ConversationStats, ConversationStore, Role,
};
pub use error::MemoryError;
pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use tokens::estimate_tokens;
pub use vector_store::{ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError};
