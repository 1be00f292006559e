//! # Chat Governor
//!
//! Sequences every fan question through the throttling primitives before it
//! reaches the upstream completion API:
//!
//! 1. cache lookup (no side effects on a hit)
//! 2. fallback-only short circuit when no keys are configured
//! 3. up to `max_retries` attempts, each one waiting for a limiter token,
//!    counting against the daily quota, claiming a key, respecting the
//!    minimum spacing since the last successful call and calling upstream
//! 4. a canned keyword-matched answer when no attempt succeeds
//!
//! Only throttling (HTTP 429) is retried, with exponential backoff. Callers
//! never see an error: `answer` always produces an `Answer`, and a fallback
//! carries the reason it was served.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::{GovernorConfig, ModelLimits};
use crate::error::{Error, Result};
use crate::fallback::static_fallback_for;
use crate::throttle::{ApiKeyPool, DailyRequestCounter, KeyPoolOptions, ResponseCache, TokenBucket};
use crate::upstream::{ChatCompletionRequest, CompletionBackend};

/// Why a canned answer was served instead of an upstream one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No API keys were configured at startup
    NoCredentials,
    /// The daily request quota is used up
    QuotaExceeded,
    /// Every attempt was throttled by the upstream
    Throttled,
    /// The upstream failed with a non-retryable error
    Upstream,
    /// No key became available in time
    KeyPoolExhausted,
    /// No limiter token became available in time
    RateLimitWait,
    /// The governor itself is misconfigured
    Internal,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::NoCredentials => "no_credentials",
            FallbackReason::QuotaExceeded => "quota_exceeded",
            FallbackReason::Throttled => "throttled",
            FallbackReason::Upstream => "upstream",
            FallbackReason::KeyPoolExhausted => "key_pool_exhausted",
            FallbackReason::RateLimitWait => "rate_limit_wait",
            FallbackReason::Internal => "internal",
        }
    }

    fn from_error(error: &Error) -> Self {
        match error {
            Error::QuotaExceeded { .. } => FallbackReason::QuotaExceeded,
            Error::RateLimit { .. } => FallbackReason::Throttled,
            Error::KeyPoolExhausted { .. } => FallbackReason::KeyPoolExhausted,
            Error::RateLimitWait { .. } => FallbackReason::RateLimitWait,
            Error::NoApiKeys | Error::UnknownModel(_) | Error::Config(_) => FallbackReason::Internal,
            _ => FallbackReason::Upstream,
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of `ChatGovernor::answer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Served from the response cache
    Cached(String),
    /// Fresh upstream completion
    Upstream(String),
    /// Canned answer
    Fallback { text: String, reason: FallbackReason },
}

impl Answer {
    pub fn text(&self) -> &str {
        match self {
            Answer::Cached(text) | Answer::Upstream(text) => text,
            Answer::Fallback { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Answer::Cached(text) | Answer::Upstream(text) => text,
            Answer::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Answer::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            Answer::Fallback { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Process-wide mutable state shared by all requests
#[derive(Debug)]
pub struct GovernorState {
    pub cache: ResponseCache,
    pub daily: DailyRequestCounter,
    /// One bucket per catalog model
    pub limiters: HashMap<String, TokenBucket>,
    /// `None` puts the governor in fallback-only mode
    pub keys: Option<ApiKeyPool>,
    /// Completion time of the last successful upstream call
    last_request: Mutex<Option<Instant>>,
}

impl GovernorState {
    pub fn new(config: &GovernorConfig) -> Self {
        let limiters = config
            .catalog
            .iter()
            .map(|(model, limits)| {
                let bucket = TokenBucket::new(limits.requests_per_minute).with_max_wait(config.rate_limit_max_wait);
                (model.clone(), bucket)
            })
            .collect();

        let keys = if config.api_keys.is_empty() {
            None
        } else {
            Some(ApiKeyPool::new(
                config.api_keys.iter().cloned(),
                KeyPoolOptions {
                    cooldown: config.key_cooldown,
                    max_failures: config.key_max_failures,
                    poll_interval: config.key_poll_interval,
                    max_wait: config.key_pool_max_wait,
                },
            ))
        };

        Self {
            cache: ResponseCache::new(config.cache_ttl, config.cache_max_entries),
            daily: DailyRequestCounter::new(Arc::new(config.catalog.clone())),
            limiters,
            keys,
            last_request: Mutex::new(None),
        }
    }

    pub async fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock().await
    }
}

/// Outbound call governor in front of a completion backend
pub struct ChatGovernor<B> {
    backend: B,
    config: GovernorConfig,
    limits: ModelLimits,
    state: GovernorState,
}

impl<B: CompletionBackend> ChatGovernor<B> {
    pub fn new(backend: B, config: GovernorConfig) -> Result<Self> {
        config.validate()?;
        let limits = *config.model_limits()?;
        let state = GovernorState::new(&config);
        Ok(Self {
            backend,
            config,
            limits,
            state,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> &GovernorState {
        &self.state
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn limits(&self) -> &ModelLimits {
        &self.limits
    }

    /// Bucket of the configured model
    pub fn limiter(&self) -> Option<&TokenBucket> {
        self.state.limiters.get(&self.config.model)
    }

    /// Answer a fan question, degrading to a canned answer instead of failing
    #[instrument(skip(self), level = "debug")]
    pub async fn answer(&self, query: &str) -> Answer {
        if let Some(text) = self.state.cache.get(query).await {
            debug!("Cache hit");
            return Answer::Cached(text);
        }

        let Some(keys) = &self.state.keys else {
            return self.fallback(query, FallbackReason::NoCredentials);
        };
        let Some(limiter) = self.limiter() else {
            return self.fallback(query, FallbackReason::Internal);
        };

        let mut reason = FallbackReason::Throttled;
        for attempt in 0..self.config.max_retries {
            if let Err(e) = limiter.acquire_token().await {
                reason = FallbackReason::from_error(&e);
                break;
            }

            match self.attempt(keys, query).await {
                Ok(text) => {
                    info!(attempt, "Upstream answered");
                    return Answer::Upstream(text);
                }
                Err(e) if e.is_retryable() => {
                    reason = FallbackReason::Throttled;
                    if attempt + 1 < self.config.max_retries {
                        let delay = self
                            .config
                            .base_retry_delay
                            .saturating_mul(2u32.saturating_pow(attempt));
                        warn!(
                            "Upstream throttled. Retrying after {} ms (attempt {}/{})",
                            delay.as_millis(),
                            attempt + 1,
                            self.config.max_retries
                        );
                        sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!("Upstream call failed: {}", e);
                    reason = FallbackReason::from_error(&e);
                    break;
                }
            }
        }

        self.fallback(query, reason)
    }

    /// One guarded upstream call; a claimed key is marked with the outcome
    async fn attempt(&self, keys: &ApiKeyPool, query: &str) -> Result<String> {
        let model = self.config.model.as_str();
        if !self.state.daily.increment_and_check(model).await? {
            return Err(Error::QuotaExceeded {
                model: model.to_string(),
                count: self.state.daily.count().await,
                limit: self.limits.requests_per_day,
            });
        }

        let key = keys.get_available_key().await?;
        self.wait_for_spacing().await;

        let request = ChatCompletionRequest::for_query(model, &self.limits, query);
        match self.backend.complete(&key, &request).await {
            Ok(text) => {
                keys.mark_success(&key).await;
                *self.state.last_request.lock().await = Some(Instant::now());
                self.state.cache.put(query, text.clone()).await;
                Ok(text)
            }
            Err(e) => {
                keys.mark_failure(&key).await;
                Err(e)
            }
        }
    }

    /// Sleep out the rest of the minimum interval since the last successful call
    async fn wait_for_spacing(&self) {
        let last_request = *self.state.last_request.lock().await;
        let Some(last_request) = last_request else {
            return;
        };
        let remaining = self.limits.min_spacing().saturating_sub(last_request.elapsed());
        if !remaining.is_zero() {
            debug!("Spacing upstream calls. Waiting {} ms", remaining.as_millis());
            sleep(remaining).await;
        }
    }

    fn fallback(&self, query: &str, reason: FallbackReason) -> Answer {
        warn!(%reason, "Serving fallback answer");
        Answer::Fallback {
            text: static_fallback_for(query).to_string(),
            reason,
        }
    }
}
