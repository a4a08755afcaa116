//! Per-caller conversational memory.
//!
//! Sessions are created lazily on first use and live for the process
//! lifetime; callers supply opaque identifiers and external hygiene bounds
//! their number. History mutations are serialized per session: the map sits
//! behind an async RwLock and each session behind its own Mutex, so
//! concurrent requests on one identifier cannot lose appends.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::condition::Condition;

/// One resolved turn: the question asked and the condition it became.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub question: String,
    pub condition: Condition,
}

/// Bounded, append-only conversation history. Oldest entries are evicted
/// first once `max_history` is reached.
#[derive(Debug)]
pub struct Session {
    history: VecDeque<HistoryEntry>,
    max_history: usize,
}

impl Session {
    fn new(max_history: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(max_history),
            max_history,
        }
    }

    pub fn append(&mut self, question: &str, condition: &Condition) {
        self.history.push_back(HistoryEntry {
            question: question.to_string(),
            condition: condition.clone(),
        });
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    /// Ordered history, most-recent-last.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.iter().cloned().collect()
    }
}

/// Process-wide session registry. Cloning shares the underlying store.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Session>>>>>,
    max_history: usize,
}

impl SessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_history: max_history.max(1),
        }
    }

    /// Fetch the handle for `session_id`, creating the session on first use.
    /// Repeated calls with the same identifier reuse the existing handle.
    pub async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(session_id) {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(self.max_history))))
            .clone()
    }

    pub async fn append(&self, session_id: &str, question: &str, condition: &Condition) {
        let session = self.get_or_create(session_id).await;
        session.lock().await.append(question, condition);
    }

    /// History for `session_id`, empty if the session does not exist yet.
    pub async fn history(&self, session_id: &str) -> Vec<HistoryEntry> {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).cloned()
        };
        match handle {
            Some(session) => session.lock().await.history(),
            None => Vec::new(),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Drop near-duplicate questions from prompt context. Keeps the first of
/// each similarity cluster (Jaro-Winkler above `threshold`), preserving
/// order, so repeated phrasings don't crowd out older context.
pub fn compact_history(entries: &[HistoryEntry], threshold: f64) -> Vec<HistoryEntry> {
    let mut kept: Vec<HistoryEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        let duplicate = kept
            .iter()
            .any(|prev| strsim::jaro_winkler(&prev.question, &entry.question) > threshold);
        if !duplicate {
            kept.push(entry.clone());
        }
    }
    kept
}
