use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

/// Where session snapshots and concept mastery go.
///
/// Writes are fire-and-forget: a store that cannot persist something logs
/// it and moves on, the tutor never waits on or fails because of it.
pub trait SessionStore: Send + Sync {
    /// Saves the latest snapshot for `session_id`, replacing any older one.
    fn store(&self, session_id: &str, data: serde_json::Value);

    /// Records a mastery level in `0.0..=1.0` for a concept.
    fn track_concept_mastery(&self, concept: &str, level: f32);

    /// Most recent mastery level for `concept`, or 0.0 if never tracked.
    fn concept_mastery(&self, concept: &str) -> f32;

    /// Number of distinct sessions stored.
    fn session_count(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasteryRecord {
    pub concept: String,
    pub level: f32,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, serde_json::Value>,
    writes: usize,
    mastery: Vec<MasteryRecord>,
}

/// Volatile store: everything lives in the process and is gone on exit.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave Inner half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self, session_id: &str) -> Option<serde_json::Value> {
        self.lock().sessions.get(session_id).cloned()
    }

    /// Total number of `store` calls across all sessions.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Every mastery record, oldest first.
    pub fn mastery_history(&self) -> Vec<MasteryRecord> {
        self.lock().mastery.clone()
    }
}

impl SessionStore for InMemoryStore {
    fn store(&self, session_id: &str, data: serde_json::Value) {
        let mut inner = self.lock();
        inner.sessions.insert(session_id.to_string(), data);
        inner.writes += 1;
        debug!("Stored snapshot for session {session_id} (write #{})", inner.writes);
    }

    fn track_concept_mastery(&self, concept: &str, level: f32) {
        let level = level.clamp(0.0, 1.0);
        debug!("Mastery of {concept}: {level:.1}");
        self.lock().mastery.push(MasteryRecord {
            concept: concept.to_lowercase(),
            level,
            at: Utc::now(),
        });
    }

    fn concept_mastery(&self, concept: &str) -> f32 {
        let concept = concept.to_lowercase();
        self.lock()
            .mastery
            .iter()
            .rev()
            .find(|r| r.concept == concept)
            .map(|r| r.level)
            .unwrap_or(0.0)
    }

    fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }
}
