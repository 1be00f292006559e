//! Rotating pool of upstream API keys with per-key cooldown and failure tracking.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug)]
struct ApiKeyRecord {
    key: String,
    last_used: Option<Instant>,
    failure_count: u32,
}

impl ApiKeyRecord {
    fn is_available(&self, now: Instant, cooldown: Duration, max_failures: u32) -> bool {
        let rested = self
            .last_used
            .is_none_or(|last_used| now.duration_since(last_used) >= cooldown);
        rested && self.failure_count < max_failures
    }
}

/// Observable state of one key, with the secret masked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    pub key: String,
    pub failure_count: u32,
    pub available: bool,
}

/// Settings for `ApiKeyPool`
#[derive(Debug, Clone, Copy)]
pub struct KeyPoolOptions {
    pub cooldown: Duration,
    pub max_failures: u32,
    pub poll_interval: Duration,
    pub max_wait: Option<Duration>,
}

impl Default for KeyPoolOptions {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(1000),
            max_failures: 3,
            poll_interval: Duration::from_secs(5),
            max_wait: None,
        }
    }
}

/// Hands out the first rested, healthy key
///
/// A key that reaches `max_failures` stays out of rotation until it records a
/// success; there is no time-based recovery.
#[derive(Debug)]
pub struct ApiKeyPool {
    records: Mutex<Vec<ApiKeyRecord>>,
    options: KeyPoolOptions,
}

impl ApiKeyPool {
    pub fn new<I, S>(keys: I, options: KeyPoolOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = keys
            .into_iter()
            .map(|key| ApiKeyRecord {
                key: key.into(),
                last_used: None,
                failure_count: 0,
            })
            .collect();
        Self {
            records: Mutex::new(records),
            options,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Claim an available key, polling until one is rested and healthy
    pub async fn get_available_key(&self) -> Result<String> {
        let started = Instant::now();
        loop {
            {
                let mut records = self.records.lock().await;
                if records.is_empty() {
                    return Err(Error::NoApiKeys);
                }
                let now = Instant::now();
                let KeyPoolOptions {
                    cooldown,
                    max_failures,
                    ..
                } = self.options;
                if let Some(record) = records
                    .iter_mut()
                    .find(|record| record.is_available(now, cooldown, max_failures))
                {
                    record.last_used = Some(now);
                    return Ok(record.key.clone());
                }
            }

            let waited = started.elapsed();
            if let Some(max_wait) = self.options.max_wait {
                if waited + self.options.poll_interval > max_wait {
                    warn!("No API key available after {} ms", waited.as_millis());
                    return Err(Error::KeyPoolExhausted {
                        waited_ms: waited.as_millis() as u64,
                    });
                }
            }

            debug!(
                "No API key available. Polling again in {} ms",
                self.options.poll_interval.as_millis()
            );
            sleep(self.options.poll_interval).await;
        }
    }

    /// Reset the failure count of `key`
    pub async fn mark_success(&self, key: &str) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.iter_mut().find(|record| record.key == key) {
            record.failure_count = 0;
        }
    }

    /// Count a failure for `key` and restart its cooldown
    pub async fn mark_failure(&self, key: &str) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.iter_mut().find(|record| record.key == key) {
            record.failure_count += 1;
            record.last_used = Some(Instant::now());
            debug!(
                key = %mask_key(key),
                failures = record.failure_count,
                "Recorded API key failure"
            );
            if record.failure_count >= self.options.max_failures {
                warn!(key = %mask_key(key), "API key removed from rotation");
            }
        }
    }

    /// Masked per-key state
    pub async fn snapshot(&self) -> Vec<KeyStatus> {
        let records = self.records.lock().await;
        let now = Instant::now();
        records
            .iter()
            .map(|record| KeyStatus {
                key: mask_key(&record.key),
                failure_count: record.failure_count,
                available: record.is_available(now, self.options.cooldown, self.options.max_failures),
            })
            .collect()
    }
}

/// Keep the last four characters of a secret
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> KeyPoolOptions {
        KeyPoolOptions {
            cooldown: Duration::from_secs(1),
            max_failures: 3,
            poll_interval: Duration::from_secs(5),
            max_wait: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotates_to_rested_key() {
        let pool = ApiKeyPool::new(["key-a", "key-b"], options());
        assert_eq!(pool.get_available_key().await.unwrap(), "key-a");
        // key-a is cooling down
        assert_eq!(pool.get_available_key().await.unwrap(), "key-b");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(pool.get_available_key().await.unwrap(), "key-a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_by_polling_when_all_cooling_down() {
        let pool = ApiKeyPool::new(["key-a"], options());
        pool.get_available_key().await.unwrap();

        let start = Instant::now();
        assert_eq!(pool.get_available_key().await.unwrap(), "key-a");
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(5), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(6), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_key_excluded_until_success() {
        let pool = ApiKeyPool::new(
            ["key-a"],
            KeyPoolOptions {
                max_wait: Some(Duration::from_secs(60)),
                ..options()
            },
        );
        for _ in 0..3 {
            pool.mark_failure("key-a").await;
        }
        tokio::time::advance(Duration::from_secs(3600)).await;

        let result = pool.get_available_key().await;
        assert!(matches!(result, Err(Error::KeyPoolExhausted { .. })));
        assert!(!pool.snapshot().await[0].available);

        pool.mark_success("key-a").await;
        assert_eq!(pool.get_available_key().await.unwrap(), "key-a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_refreshes_cooldown() {
        let pool = ApiKeyPool::new(["key-a", "key-b"], options());
        tokio::time::advance(Duration::from_secs(10)).await;
        pool.mark_failure("key-a").await;

        assert_eq!(pool.get_available_key().await.unwrap(), "key-b");
        let snapshot = pool.snapshot().await;
        assert_eq!(snapshot[0].failure_count, 1);
        assert!(!snapshot[0].available);
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let pool = ApiKeyPool::new(Vec::<String>::new(), options());
        assert!(pool.is_empty().await);
        assert!(matches!(pool.get_available_key().await, Err(Error::NoApiKeys)));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-1234567890abcd"), "****abcd");
        assert_eq!(mask_key("abc"), "****");
    }
}
