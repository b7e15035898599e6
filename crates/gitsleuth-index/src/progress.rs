//! Indexing progress counters and reporting.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Stage of an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPhase {
    Discovering,
    Chunking,
    Embedding,
    Done,
    Failed,
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: IndexPhase,
    pub percent: u8,
    pub message: String,
}

/// Receives progress events from an indexing run.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Monotonic counters for one indexing run.
///
/// Readable from any thread while the run is in flight; `idle_for` exposes how
/// long ago the last file or batch completed so stalled runs can be detected.
#[derive(Debug)]
pub struct IndexProgress {
    started: Instant,
    files_total: AtomicUsize,
    files_processed: AtomicUsize,
    chunks_total: AtomicUsize,
    chunks_embedded: AtomicUsize,
    last_activity_ms: AtomicU64,
}

/// Point-in-time copy of [`IndexProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub files_total: usize,
    pub files_processed: usize,
    pub chunks_total: usize,
    pub chunks_embedded: usize,
}

impl Default for IndexProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            files_total: AtomicUsize::new(0),
            files_processed: AtomicUsize::new(0),
            chunks_total: AtomicUsize::new(0),
            chunks_embedded: AtomicUsize::new(0),
            last_activity_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_activity_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    pub(crate) fn set_files_total(&self, n: usize) {
        self.files_total.store(n, Ordering::Relaxed);
        self.touch();
    }

    pub(crate) fn file_done(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub(crate) fn set_chunks_total(&self, n: usize) {
        self.chunks_total.store(n, Ordering::Relaxed);
        self.touch();
    }

    pub(crate) fn chunks_embedded(&self, n: usize) {
        self.chunks_embedded.fetch_add(n, Ordering::Relaxed);
        self.touch();
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_total: self.files_total.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            chunks_total: self.chunks_total.load(Ordering::Relaxed),
            chunks_embedded: self.chunks_embedded.load(Ordering::Relaxed),
        }
    }

    /// Time since the last recorded activity.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }
}

impl ProgressSnapshot {
    /// Overall percent: chunking covers 10..50, embedding 50..95.
    #[must_use]
    pub fn percent(&self) -> u8 {
        fn scaled(done: usize, total: usize, from: usize, span: usize) -> u8 {
            let pct = if total == 0 {
                from + span
            } else {
                from + span * done.min(total) / total
            };
            u8::try_from(pct).unwrap_or(100)
        }
        if self.chunks_total == 0 {
            scaled(self.files_processed, self.files_total, 10, 40)
        } else {
            scaled(self.chunks_embedded, self.chunks_total, 50, 45)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let p = IndexProgress::new();
        p.set_files_total(4);
        p.file_done();
        p.file_done();
        let s = p.snapshot();
        assert_eq!(s.files_processed, 2);
        assert_eq!(s.percent(), 30);

        p.set_chunks_total(10);
        p.chunks_embedded(5);
        assert_eq!(p.snapshot().percent(), 72);
        p.chunks_embedded(5);
        assert_eq!(p.snapshot().percent(), 95);
    }

    #[test]
    fn idle_time_resets_on_activity() {
        let p = IndexProgress::new();
        std::thread::sleep(Duration::from_millis(20));
        assert!(p.idle_for() >= Duration::from_millis(20));
        p.file_done();
        assert!(p.idle_for() < Duration::from_millis(20));
    }

    #[test]
    fn event_serializes_phase_lowercase() {
        let event = ProgressEvent {
            phase: IndexPhase::Embedding,
            percent: 60,
            message: "embedding".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "embedding");
    }
}
