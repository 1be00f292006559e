//! Time-bounded cache of upstream answers keyed by the exact query text.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// A cached upstream answer
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub response_text: String,
    pub cached_at: Instant,
}

/// Query -> answer cache with a fixed TTL
///
/// Expired entries are misses but stay in the map until they are overwritten
/// or the map reaches `max_entries`.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CachedResponse>>,
    ttl: Duration,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Cached answer for `query` if present and not older than the TTL
    pub async fn get(&self, query: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        let entry = entries.get(query)?;
        if entry.cached_at.elapsed() > self.ttl {
            debug!("Cache entry expired");
            return None;
        }
        Some(entry.response_text.clone())
    }

    /// Store `response_text` for `query`, replacing any previous entry
    pub async fn put(&self, query: impl Into<String>, response_text: impl Into<String>) {
        let query = query.into();
        let mut entries = self.entries.lock().await;

        if !entries.contains_key(&query) && entries.len() >= self.max_entries {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.cached_at.elapsed() <= ttl);
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.cached_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            query,
            CachedResponse {
                response_text: response_text.into(),
                cached_at: Instant::now(),
            },
        );
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
