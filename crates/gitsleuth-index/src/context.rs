//! Generation prompt assembly from retrieved chunks and conversation history.

use std::fmt::Write;
use std::sync::Arc;

use crate::chunker::Chunk;
use crate::error::{IndexError, Result};
use gitsleuth_llm::provider::Message;
use gitsleuth_memory::ConversationStore;

/// Separator between rendered chunks.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Stands in for the code context when retrieval found nothing.
pub const NO_CONTEXT_FOUND: &str =
    "No relevant code context was found in the repository for this question.";

pub const SYSTEM_PROMPT: &str = "\
You are an expert code analyst. Answer questions based on the provided code context.
Guidelines:
1. Use ONLY the provided code context to answer questions.
2. Reference exact file names and line numbers when possible.
3. Focus on code structure and functionality.
4. Provide clear, actionable insights.
5. If the context doesn't contain enough information, say so clearly.
6. Do not include confidence ratings in your response.";

/// Code and history text ready to be placed into a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledContext {
    pub code: String,
    pub history: String,
}

impl AssembledContext {
    /// System instruction plus the user turn carrying context, history and question.
    #[must_use]
    pub fn into_messages(self, question: &str) -> Vec<Message> {
        vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(format!(
                "Context:\n{}\n\nConversation:\n{}\n\nQuestion: {question}",
                self.code, self.history
            )),
        ]
    }
}

/// `File: <path> (lines a-b)` followed by the chunk content.
#[must_use]
pub fn render_chunk(chunk: &Chunk) -> String {
    let mut out = String::with_capacity(chunk.content.len() + chunk.file_path.len() + 32);
    let _ = writeln!(
        out,
        "File: {} (lines {}-{})",
        chunk.file_path, chunk.start_line, chunk.end_line
    );
    out.push_str(&chunk.content);
    out
}

/// Render chunks in order; no chunks renders the placeholder block.
#[must_use]
pub fn render_code_context<'a, I>(chunks: I) -> String
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let blocks: Vec<String> = chunks.into_iter().map(render_chunk).collect();
    if blocks.is_empty() {
        NO_CONTEXT_FOUND.to_owned()
    } else {
        blocks.join(BLOCK_SEPARATOR)
    }
}

/// Combines retrieved chunks with a bounded slice of conversation history.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    conversations: Arc<ConversationStore>,
}

impl ContextAssembler {
    #[must_use]
    pub fn new(conversations: Arc<ConversationStore>) -> Self {
        Self { conversations }
    }

    /// Render `chunks` and the newest history of `conversation_id` that fits in
    /// `max_context_tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ConversationNotFound`] for an unknown conversation.
    pub fn assemble<'a, I>(
        &self,
        chunks: I,
        conversation_id: &str,
        max_context_tokens: usize,
    ) -> Result<AssembledContext>
    where
        I: IntoIterator<Item = &'a Chunk>,
    {
        let history = self
            .conversations
            .context(conversation_id, max_context_tokens)
            .map_err(IndexError::from_memory)?;
        Ok(AssembledContext {
            code: render_code_context(chunks),
            history,
        })
    }
}
