//! Embedding and generation provider abstraction.
//!
//! The query engine talks to text-generation and embedding backends only
//! through [`LlmProvider`]. [`openai::OpenAiProvider`] speaks the
//! OpenAI-compatible HTTP API; the `mock` feature adds a deterministic
//! in-process provider for tests.

pub mod any;
pub mod error;
pub(crate) mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub(crate) mod retry;

pub use any::AnyProvider;
pub use error::LlmError;
pub use provider::LlmProvider;
