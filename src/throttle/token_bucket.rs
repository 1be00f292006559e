//! Token bucket smoothing upstream calls to a requests-per-minute budget.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug)]
struct TokenBucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Continuously refilling token bucket, one per upstream model
///
/// Waiters poll instead of queueing, so concurrent callers are not served in
/// arrival order and a burst of callers may briefly exceed the nominal rate.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<TokenBucketState>,
    max_tokens: f64,
    refill_rate_per_sec: f64,
    max_wait: Option<Duration>,
}

impl TokenBucket {
    /// A full bucket holding `requests_per_minute` tokens
    pub fn new(requests_per_minute: u32) -> Self {
        let max_tokens = f64::from(requests_per_minute.max(1));
        Self {
            state: Mutex::new(TokenBucketState {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
            max_tokens,
            refill_rate_per_sec: max_tokens / 60.0,
            max_wait: None,
        }
    }

    /// Fail `acquire_token` instead of waiting longer than `max_wait`
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }

    /// Time for one token to be refilled
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refill_rate_per_sec)
    }

    fn refill(&self, state: &mut TokenBucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate_per_sec).min(self.max_tokens);
        state.last_refill = now;
    }

    /// Take one token, sleeping until one is available
    pub async fn acquire_token(&self) -> Result<()> {
        let started = Instant::now();
        loop {
            {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
            }

            let wait = self.retry_interval();
            if let Some(max_wait) = self.max_wait {
                let waited = started.elapsed();
                if waited + wait > max_wait {
                    return Err(Error::RateLimitWait {
                        waited_ms: waited.as_millis() as u64,
                    });
                }
            }

            debug!("Rate limiter empty. Waiting {} ms for a token", wait.as_millis());
            sleep(wait).await;
        }
    }

    /// Current token level after refilling
    pub async fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }
}
