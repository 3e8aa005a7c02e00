use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::Serialize;
use uuid::Uuid;

use super::concepts::Concept;
use super::problems::Problem;

/// One processed learner submission.
#[derive(Debug, Clone, Serialize)]
pub struct Interaction {
    pub message: String,
    pub source: String,
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

/// Everything the tutor knows about one learner session.
///
/// Owned by exactly one session and threaded through every `handle` call
/// by `&mut`. Attempts only go up and the concept sets only grow; the
/// only way back is a fresh context.
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub problem: Problem,
    attempt_count: u32,
    last_source: String,
    identified_gaps: IndexSet<Concept>,
    concepts_covered: IndexSet<Concept>,
    history: Vec<Interaction>,
}

impl SessionContext {
    pub fn new(problem: Problem) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            problem,
            attempt_count: 0,
            last_source: String::new(),
            identified_gaps: IndexSet::new(),
            concepts_covered: IndexSet::new(),
            history: Vec::new(),
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn last_source(&self) -> &str {
        &self.last_source
    }

    pub fn identified_gaps(&self) -> &IndexSet<Concept> {
        &self.identified_gaps
    }

    pub fn concepts_covered(&self) -> &IndexSet<Concept> {
        &self.concepts_covered
    }

    pub fn history(&self) -> &[Interaction] {
        &self.history
    }

    /// Opens a new attempt: bumps the counter and logs the submission.
    /// Returns the new attempt number.
    pub fn begin_attempt(&mut self, message: &str, source: &str) -> u32 {
        self.attempt_count += 1;
        self.last_source = source.to_string();
        self.history.push(Interaction {
            message: message.to_string(),
            source: source.to_string(),
            attempt: self.attempt_count,
            at: Utc::now(),
        });
        self.attempt_count
    }

    /// Records a concept the learner appears to be missing. Returns false
    /// when it was already known.
    pub fn record_gap(&mut self, concept: Concept) -> bool {
        self.identified_gaps.insert(concept)
    }

    pub fn mark_covered(&mut self, concept: Concept) -> bool {
        self.concepts_covered.insert(concept)
    }

    /// The last `limit` interactions, oldest first.
    pub fn recent_history(&self, limit: usize) -> &[Interaction] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }
}
