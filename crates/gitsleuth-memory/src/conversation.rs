//! Bounded, thread-safe conversation history.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::confidence::Confidence;
use crate::error::{MemoryError, Result};
use crate::tokens::window_lines;

pub const DEFAULT_MAX_MESSAGES: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationStats {
    pub conversation_id: String,
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct ConversationRecord {
    session_id: String,
    messages: VecDeque<ConversationMessage>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// In-memory conversation store.
///
/// Each conversation keeps at most `max_messages`; appending beyond that
/// evicts the oldest message. All records sit behind one `RwLock`.
pub struct ConversationStore {
    records: RwLock<HashMap<String, ConversationRecord>>,
    max_messages: usize,
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("max_messages", &self.max_messages)
            .finish_non_exhaustive()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> MemoryError {
    MemoryError::Other(format!("conversation lock poisoned: {e}"))
}

impl ConversationStore {
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_messages: max_messages.max(1),
        }
    }

    /// Create an empty conversation owned by `session_id` and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn create(&self, session_id: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.records.write().map_err(poisoned)?.insert(
            id.clone(),
            ConversationRecord {
                session_id: session_id.to_owned(),
                messages: VecDeque::new(),
                created_at: now,
                updated_at: now,
            },
        );
        tracing::debug!(conversation_id = %id, session_id, "conversation created");
        Ok(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records
            .read()
            .is_ok_and(|records| records.contains_key(id))
    }

    /// Append a message.
    ///
    /// Assistant messages without an explicit confidence get one inferred from their text.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ConversationNotFound`] for an unknown id.
    pub fn append(
        &self,
        id: &str,
        role: Role,
        content: impl Into<String>,
        confidence: Option<Confidence>,
    ) -> Result<()> {
        let content = content.into();
        let confidence = match (role, confidence) {
            (_, Some(c)) => Some(c),
            (Role::Assistant, None) => Some(Confidence::infer_from_text(&content)),
            (Role::User, None) => None,
        };

        let mut records = self.records.write().map_err(poisoned)?;
        let record = records
            .get_mut(id)
            .ok_or_else(|| MemoryError::ConversationNotFound(id.to_owned()))?;

        let now = Utc::now();
        if record.messages.len() == self.max_messages {
            record.messages.pop_front();
        }
        record.messages.push_back(ConversationMessage {
            role,
            content,
            timestamp: now,
            confidence,
        });
        record.updated_at = now;
        Ok(())
    }

    /// The last `limit` messages, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ConversationNotFound`] for an unknown id.
    pub fn history(&self, id: &str, limit: usize) -> Result<Vec<ConversationMessage>> {
        let records = self.records.read().map_err(poisoned)?;
        let record = records
            .get(id)
            .ok_or_else(|| MemoryError::ConversationNotFound(id.to_owned()))?;
        let skip = record.messages.len().saturating_sub(limit);
        Ok(record.messages.iter().skip(skip).cloned().collect())
    }

    /// Newest messages rendered as `role: content` lines within a word-count budget.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ConversationNotFound`] for an unknown id.
    pub fn context(&self, id: &str, max_tokens: usize) -> Result<String> {
        let records = self.records.read().map_err(poisoned)?;
        let record = records
            .get(id)
            .ok_or_else(|| MemoryError::ConversationNotFound(id.to_owned()))?;
        let lines = record
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content));
        Ok(window_lines(lines, max_tokens))
    }

    /// # Errors
    ///
    /// Returns [`MemoryError::ConversationNotFound`] for an unknown id.
    pub fn stats(&self, id: &str) -> Result<ConversationStats> {
        let records = self.records.read().map_err(poisoned)?;
        let record = records
            .get(id)
            .ok_or_else(|| MemoryError::ConversationNotFound(id.to_owned()))?;
        let user_messages = record
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count();
        Ok(ConversationStats {
            conversation_id: id.to_owned(),
            total_messages: record.messages.len(),
            user_messages,
            assistant_messages: record.messages.len() - user_messages,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Snapshot of the whole conversation.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ConversationNotFound`] for an unknown id.
    pub fn get(&self, id: &str) -> Result<Conversation> {
        let records = self.records.read().map_err(poisoned)?;
        let record = records
            .get(id)
            .ok_or_else(|| MemoryError::ConversationNotFound(id.to_owned()))?;
        Ok(Conversation {
            id: id.to_owned(),
            session_id: record.session_id.clone(),
            messages: record.messages.iter().cloned().collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Drop all messages but keep the conversation.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ConversationNotFound`] for an unknown id.
    pub fn clear(&self, id: &str) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        let record = records
            .get_mut(id)
            .ok_or_else(|| MemoryError::ConversationNotFound(id.to_owned()))?;
        record.messages.clear();
        record.updated_at = Utc::now();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`MemoryError::ConversationNotFound`] for an unknown id.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.records
            .write()
            .map_err(poisoned)?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MemoryError::ConversationNotFound(id.to_owned()))
    }

    /// Remove every conversation belonging to `session_id`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn delete_for_session(&self, session_id: &str) -> Result<usize> {
        let mut records = self.records.write().map_err(poisoned)?;
        let before = records.len();
        records.retain(|_, r| r.session_id != session_id);
        Ok(before - records.len())
    }
}
