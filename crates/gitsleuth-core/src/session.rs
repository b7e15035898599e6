//! In-memory bookkeeping for indexing sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use gitsleuth_index::{IndexPhase, IndexReport, ProgressEvent, ProgressSink};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Indexing,
    Ready,
    Error,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one repository session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    /// Repository the session indexes.
    pub source: String,
    pub status: SessionStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IndexReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session records keyed by id.
///
/// Status only moves `indexing → ready` or `indexing → error`; going back to
/// `indexing` takes an explicit [`SessionRegistry::reset`]. While indexing,
/// progress never decreases.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session in the `indexing` state.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::LockPoisoned`] if the registry lock is poisoned.
    pub fn create(&self, source: &str) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            source: source.to_owned(),
            status: SessionStatus::Indexing,
            progress: 0,
            message: "queued".into(),
            report: None,
            created_at: now,
            updated_at: now,
        };
        self.sessions
            .write()
            .map_err(|_| ServiceError::LockPoisoned)?
            .insert(session.id.clone(), session.clone());
        tracing::debug!(session_id = %session.id, source = %source, "session created");
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::SessionNotFound`] for an unknown id.
    pub fn get(&self, id: &str) -> Result<Session> {
        self.sessions
            .read()
            .map_err(|_| ServiceError::LockPoisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::SessionNotFound(id.to_owned()))
    }

    /// All sessions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::LockPoisoned`] if the registry lock is poisoned.
    pub fn list(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .map_err(|_| ServiceError::LockPoisoned)?
            .values()
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    /// Record progress of an indexing session. Lower percentages than the
    /// current one keep the current value; sessions no longer indexing are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::SessionNotFound`] for an unknown id.
    pub fn update_progress(&self, id: &str, percent: u8, message: impl Into<String>) -> Result<()> {
        self.with_session(id, |session| {
            if session.status != SessionStatus::Indexing {
                tracing::debug!(session_id = %id, status = %session.status, "ignoring late progress");
                return Ok(());
            }
            session.progress = session.progress.max(percent.min(100));
            session.message = message.into();
            session.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Move an indexing session to `ready`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidTransition`] unless the session is indexing.
    pub fn mark_ready(&self, id: &str, report: IndexReport) -> Result<()> {
        self.transition(id, SessionStatus::Ready, |session| {
            session.progress = 100;
            session.message = format!(
                "indexed {} chunks from {} files",
                report.chunks_indexed, report.files_chunked
            );
            session.report = Some(report);
        })
    }

    /// Move an indexing session to `error`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidTransition`] unless the session is indexing.
    pub fn mark_failed(&self, id: &str, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.transition(id, SessionStatus::Error, |session| {
            session.message = message;
        })
    }

    /// Put a ready or failed session back into `indexing` with progress cleared.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::SessionNotFound`] for an unknown id and
    /// [`ServiceError::SessionNotReady`] if the session is still indexing.
    pub fn reset(&self, id: &str) -> Result<()> {
        self.with_session(id, |session| {
            if session.status == SessionStatus::Indexing {
                return Err(ServiceError::SessionNotReady {
                    session_id: id.to_owned(),
                    status: session.status,
                });
            }
            session.status = SessionStatus::Indexing;
            session.progress = 0;
            session.message = "queued".into();
            session.report = None;
            session.updated_at = Utc::now();
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::SessionNotFound`] for an unknown id.
    pub fn remove(&self, id: &str) -> Result<Session> {
        self.sessions
            .write()
            .map_err(|_| ServiceError::LockPoisoned)?
            .remove(id)
            .ok_or_else(|| ServiceError::SessionNotFound(id.to_owned()))
    }

    /// A progress sink that forwards events to session `id`.
    #[must_use]
    pub fn sink(self: &Arc<Self>, id: &str) -> SessionProgress {
        SessionProgress {
            registry: Arc::clone(self),
            session_id: id.to_owned(),
        }
    }

    fn transition(
        &self,
        id: &str,
        to: SessionStatus,
        apply: impl FnOnce(&mut Session),
    ) -> Result<()> {
        self.with_session(id, |session| {
            if session.status != SessionStatus::Indexing {
                return Err(ServiceError::InvalidTransition {
                    session_id: id.to_owned(),
                    from: session.status,
                    to,
                });
            }
            session.status = to;
            apply(session);
            session.updated_at = Utc::now();
            tracing::info!(session_id = %id, status = %to, "session status changed");
            Ok(())
        })
    }

    fn with_session<T>(&self, id: &str, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut sessions = self.sessions.write().map_err(|_| ServiceError::LockPoisoned)?;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| ServiceError::SessionNotFound(id.to_owned()))?;
        f(session)
    }
}

/// [`ProgressSink`] bound to one session of a [`SessionRegistry`].
#[derive(Debug, Clone)]
pub struct SessionProgress {
    registry: Arc<SessionRegistry>,
    session_id: String,
}

impl ProgressSink for SessionProgress {
    fn report(&self, event: ProgressEvent) {
        // Terminal states are set from the run outcome, not from events.
        if matches!(event.phase, IndexPhase::Done | IndexPhase::Failed) {
            return;
        }
        if let Err(e) = self
            .registry
            .update_progress(&self.session_id, event.percent, event.message)
        {
            tracing::warn!(session_id = %self.session_id, "dropping progress event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(phase: IndexPhase, percent: u8) -> ProgressEvent {
        ProgressEvent {
            phase,
            percent,
            message: format!("{percent}%"),
        }
    }

    #[test]
    fn new_session_is_indexing() {
        let registry = SessionRegistry::new();
        let session = registry.create("/tmp/repo").unwrap();
        assert_eq!(session.status, SessionStatus::Indexing);
        assert_eq!(session.progress, 0);
        assert_eq!(registry.get(&session.id).unwrap(), session);
    }

    #[test]
    fn unknown_session() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(ServiceError::SessionNotFound(ref id)) if id == "missing"
        ));
        assert!(registry.update_progress("missing", 10, "x").is_err());
    }

    #[test]
    fn progress_never_decreases_while_indexing() {
        let registry = Arc::new(SessionRegistry::new());
        let id = registry.create("repo").unwrap().id;
        let sink = registry.sink(&id);

        sink.report(event(IndexPhase::Chunking, 30));
        sink.report(event(IndexPhase::Chunking, 20));
        let session = registry.get(&id).unwrap();
        assert_eq!(session.progress, 30);
        assert_eq!(session.message, "20%");

        sink.report(event(IndexPhase::Embedding, 70));
        assert_eq!(registry.get(&id).unwrap().progress, 70);
    }

    #[test]
    fn done_event_does_not_finish_session() {
        let registry = Arc::new(SessionRegistry::new());
        let id = registry.create("repo").unwrap().id;
        registry.sink(&id).report(event(IndexPhase::Done, 100));
        let session = registry.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Indexing);
        assert_eq!(session.progress, 0);
    }

    #[test]
    fn ready_is_terminal_until_reset() {
        let registry = SessionRegistry::new();
        let id = registry.create("repo").unwrap().id;
        registry.mark_ready(&id, IndexReport::default()).unwrap();

        let session = registry.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Ready);
        assert_eq!(session.progress, 100);
        assert!(session.report.is_some());

        let err = registry.mark_failed(&id, "boom").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition {
                from: SessionStatus::Ready,
                to: SessionStatus::Error,
                ..
            }
        ));

        registry.update_progress(&id, 5, "late").unwrap();
        assert_eq!(registry.get(&id).unwrap().progress, 100);

        registry.reset(&id).unwrap();
        let session = registry.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Indexing);
        assert_eq!(session.progress, 0);
        assert!(session.report.is_none());
        registry.mark_failed(&id, "upstream down").unwrap();
        assert_eq!(registry.get(&id).unwrap().message, "upstream down");
    }

    #[test]
    fn indexing_session_cannot_be_reset() {
        let registry = SessionRegistry::new();
        let id = registry.create("repo").unwrap().id;
        registry.update_progress(&id, 40, "embedding").unwrap();

        let err = registry.reset(&id).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::SessionNotReady {
                status: SessionStatus::Indexing,
                ..
            }
        ));
        let session = registry.get(&id).unwrap();
        assert_eq!(session.progress, 40);
        assert_eq!(session.message, "embedding");
    }

    #[test]
    fn list_and_remove() {
        let registry = SessionRegistry::new();
        let a = registry.create("a").unwrap().id;
        let b = registry.create("b").unwrap().id;
        assert_eq!(registry.list().unwrap().len(), 2);

        registry.remove(&a).unwrap();
        let left: Vec<String> = registry.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(left, vec![b]);
        assert!(registry.remove(&a).is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Ready).unwrap(),
            "\"ready\""
        );
        assert_eq!(SessionStatus::Error.to_string(), "error");
    }
}
