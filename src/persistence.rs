//! Persistence store contract (spec.md §6): the engine and aggregator
//! issue exactly two update shapes against a document store keyed by
//! activity id. The store itself is out of scope; only the trait
//! boundary and a test double live here.

use async_trait::async_trait;

use crate::error::BotError;

/// One of the two update shapes the core ever issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// `{ $set: { botExcutedTime: <sentinel> } }` — a marker transition.
    SetMarker(i64),
    /// `{ bot: true }` — mark an activity skipped by the aggregator.
    MarkSkipped,
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// `updateOne(filter, update)` with at-least-once semantics
    /// (spec.md §6). `activity_id` is the filter.
    async fn update_one(&self, activity_id: &str, update: Update) -> Result<(), BotError>;
}

/// In-memory double for tests, recording every write it receives.
#[cfg(test)]
pub struct InMemoryStore {
    writes: parking_lot::Mutex<Vec<(String, Update)>>,
}

#[cfg(test)]
impl InMemoryStore {
    pub fn new() -> Self {
        Self { writes: parking_lot::Mutex::new(Vec::new()) }
    }

    pub fn writes(&self) -> Vec<(String, Update)> {
        self.writes.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn update_one(&self, activity_id: &str, update: Update) -> Result<(), BotError> {
        self.writes.lock().push((activity_id.to_string(), update));
        Ok(())
    }
}
