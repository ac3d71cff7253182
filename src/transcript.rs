/// Client-owned chat transcript.
///
/// Append-only: entries are never edited, removed or reordered once appended.
/// A correction is a new `System` entry, so the store is an exact record of
/// what was shown.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Locally synthesised notice or error. Never sent to the backend.
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl TranscriptEntry {
    fn new(role: Role, content: impl Into<String>, agent: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            agent,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, None)
    }

    pub fn assistant(content: impl Into<String>, agent: Option<String>) -> Self {
        Self::new(Role::Assistant, content, agent)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, None)
    }
}

/// Cheap to clone; clones share the same transcript.
#[derive(Clone)]
pub struct TranscriptStore {
    entries: Arc<watch::Sender<Vec<TranscriptEntry>>>,
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { entries: Arc::new(tx) }
    }

    pub fn append(&self, entry: TranscriptEntry) {
        self.entries.send_modify(|entries| entries.push(entry));
    }

    /// The full transcript in append order.
    pub fn all(&self) -> Vec<TranscriptEntry> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wakes on every append.
    pub fn subscribe(&self) -> watch::Receiver<Vec<TranscriptEntry>> {
        self.entries.subscribe()
    }
}
