//! Bounded query-result cache.
//!
//! Process-wide, explicitly owned, created once at engine construction.
//! Entries are keyed by session, role and question so conversational context
//! cannot leak across sessions; the oldest entry is evicted at capacity.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dataset::Row;

#[derive(Debug, Clone)]
struct CacheEntry {
    condition: String,
    rows: Vec<Row>,
    inserted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Cache statistics exposed through `/stats`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// A bounded map from query key to resolved (condition, rows). A capacity of
/// zero disables caching entirely.
pub struct QueryCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<(String, Vec<Row>)> {
        if self.capacity == 0 {
            return None;
        }
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let found = inner
            .entries
            .get(key)
            .map(|entry| (entry.condition.clone(), entry.rows.clone()));
        match found {
            Some(found) => {
                inner.hits += 1;
                Some(found)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: String, condition: String, rows: Vec<Row>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if inner.entries.len() >= self.capacity && !inner.entries.contains_key(&key) {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
        }
        inner.entries.insert(
            key,
            CacheEntry {
                condition,
                rows,
                inserted_at: Utc::now(),
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        let total = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if total > 0 {
                inner.hits as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}
