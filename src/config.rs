//! # Configuration Module
//!
//! Environment-sourced configuration for the governor, the upstream client and
//! the HTTP service. Everything is read once at process start.
//!
//! ## Key Components
//!
//! - `ModelLimits` / `ModelCatalog`: per-model request budgets
//! - `GovernorConfig`: cache, quota, limiter, key pool and retry settings
//! - `UpstreamConfig`: completion endpoint location and timeout
//! - `ServerConfig`: bind address and optional inbound limit
//! - `Config`: the three together, built by `Config::from_env`
//!
//! A `.env` file in the working directory is loaded first if present; values
//! already in the environment win.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Model used when `OPENAI_MODEL` is unset
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Default completion endpoint host
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.openai.com";

/// Request budget for one upstream model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLimits {
    /// Sizes the token bucket and the minimum spacing between calls
    pub requests_per_minute: u32,

    /// Daily quota enforced by the request counter
    pub requests_per_day: u64,

    /// Per-request token ceiling; half of it is sent as `max_tokens`
    pub max_tokens_per_request: u32,
}

impl ModelLimits {
    pub const fn new(requests_per_minute: u32, requests_per_day: u64, max_tokens_per_request: u32) -> Self {
        Self {
            requests_per_minute,
            requests_per_day,
            max_tokens_per_request,
        }
    }

    /// Minimum interval between two successful upstream calls
    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(60_000 / u64::from(self.requests_per_minute.max(1)))
    }
}

/// Limits for every supported model, keyed by model name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    models: HashMap<String, ModelLimits>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert("gpt-3.5-turbo".to_string(), ModelLimits::new(3, 200, 4096));
        models.insert("gpt-4".to_string(), ModelLimits::new(3, 200, 8192));
        models.insert("gpt-4o-mini".to_string(), ModelLimits::new(3, 200, 16384));
        Self { models }
    }
}

impl ModelCatalog {
    /// An empty catalog
    pub fn empty() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Add or replace the limits of a model
    pub fn with_model(mut self, name: impl Into<String>, limits: ModelLimits) -> Self {
        self.models.insert(name.into(), limits);
        self
    }

    pub fn get(&self, model: &str) -> Option<&ModelLimits> {
        self.models.get(model)
    }

    /// Limits of `model`, or `Error::UnknownModel`
    pub fn limits(&self, model: &str) -> Result<&ModelLimits> {
        self.get(model)
            .ok_or_else(|| Error::UnknownModel(model.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ModelLimits)> {
        self.models.iter()
    }
}

/// Settings for the outbound call governor
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Credentials for the upstream API; empty means fallback-only mode
    pub api_keys: Vec<String>,

    /// Model every query is sent to
    pub model: String,

    /// Limits of all supported models
    pub catalog: ModelCatalog,

    /// Upstream attempts per query
    pub max_retries: u32,

    /// Backoff unit; attempt `n` sleeps `2^n` times this after a 429
    pub base_retry_delay: Duration,

    /// Lifetime of a cached answer
    pub cache_ttl: Duration,

    /// Upper bound on cached queries
    pub cache_max_entries: usize,

    /// Minimum interval between two uses of the same key
    pub key_cooldown: Duration,

    /// Failures after which a key is excluded until it records a success
    pub key_max_failures: u32,

    /// Sleep between scans when no key is available
    pub key_poll_interval: Duration,

    /// Give up waiting for a key after this long (`None` waits forever)
    pub key_pool_max_wait: Option<Duration>,

    /// Give up waiting for a limiter token after this long (`None` waits forever)
    pub rate_limit_max_wait: Option<Duration>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: DEFAULT_MODEL.to_string(),
            catalog: ModelCatalog::default(),
            max_retries: 3,
            base_retry_delay: Duration::from_millis(1000),
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: 1000,
            key_cooldown: Duration::from_millis(1000),
            key_max_failures: 3,
            key_poll_interval: Duration::from_millis(5000),
            key_pool_max_wait: Some(Duration::from_millis(30_000)),
            rate_limit_max_wait: None,
        }
    }
}

impl GovernorConfig {
    /// Limits of the configured model
    pub fn model_limits(&self) -> Result<&ModelLimits> {
        self.catalog.limits(&self.model)
    }

    /// Reject settings the governor cannot run with
    pub fn validate(&self) -> Result<()> {
        self.model_limits()
            .map_err(|_| Error::Config(format!("model {} is not in the model catalog", self.model)))?;
        for (name, limits) in self.catalog.iter() {
            if limits.requests_per_minute == 0 {
                return Err(Error::Config(format!(
                    "requests_per_minute for {} must be positive",
                    name
                )));
            }
        }
        if self.max_retries == 0 {
            return Err(Error::Config("MAX_RETRIES must be at least 1".to_string()));
        }
        // Zero would exclude every key before its first use
        if self.key_max_failures == 0 {
            return Err(Error::Config("KEY_MAX_FAILURES must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Location of the completion endpoint
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Scheme and host, without the `/v1/...` path
    pub base_url: String,

    /// Timeout for a single upstream call
    pub timeout: Duration,
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Config("UPSTREAM_TIMEOUT_SECS must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP service settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Global cap on `POST /chat` requests per minute (`None` disables it)
    pub inbound_requests_per_minute: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            inbound_requests_per_minute: None,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub governor: GovernorConfig,
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_keys = get("OPENAI_API_KEYS")
            .or_else(|| get("OPENAI_API_KEY"))
            .map(|raw| split_keys(&raw))
            .unwrap_or_default();

        let model = get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut catalog = ModelCatalog::default();
        let base = catalog.get(&model).copied();
        let rpm = parse_opt::<u32>(&get, "MODEL_REQUESTS_PER_MINUTE")?;
        let rpd = parse_opt::<u64>(&get, "MODEL_REQUESTS_PER_DAY")?;
        let max_tokens = parse_opt::<u32>(&get, "MODEL_MAX_TOKENS")?;
        match (base, rpm, rpd, max_tokens) {
            (Some(limits), rpm, rpd, max_tokens) => {
                catalog = catalog.with_model(
                    model.clone(),
                    ModelLimits {
                        requests_per_minute: rpm.unwrap_or(limits.requests_per_minute),
                        requests_per_day: rpd.unwrap_or(limits.requests_per_day),
                        max_tokens_per_request: max_tokens.unwrap_or(limits.max_tokens_per_request),
                    },
                );
            }
            // A model outside the built-in catalog is usable when all of its limits are given
            (None, Some(rpm), Some(rpd), Some(max_tokens)) => {
                catalog = catalog.with_model(model.clone(), ModelLimits::new(rpm, rpd, max_tokens));
            }
            (None, ..) => {}
        }

        let governor = GovernorConfig {
            api_keys,
            model,
            catalog,
            max_retries: parse_or(&get, "MAX_RETRIES", defaults.governor.max_retries)?,
            base_retry_delay: millis_or(&get, "BASE_RETRY_DELAY_MS", defaults.governor.base_retry_delay)?,
            cache_ttl: Duration::from_secs(parse_or(
                &get,
                "CACHE_TTL_SECS",
                defaults.governor.cache_ttl.as_secs(),
            )?),
            cache_max_entries: parse_or(&get, "CACHE_MAX_ENTRIES", defaults.governor.cache_max_entries)?,
            key_cooldown: millis_or(&get, "KEY_COOLDOWN_MS", defaults.governor.key_cooldown)?,
            key_max_failures: parse_or(&get, "KEY_MAX_FAILURES", defaults.governor.key_max_failures)?,
            key_poll_interval: millis_or(&get, "KEY_POLL_INTERVAL_MS", defaults.governor.key_poll_interval)?,
            key_pool_max_wait: match parse_opt::<u64>(&get, "KEY_POOL_MAX_WAIT_MS")? {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => defaults.governor.key_pool_max_wait,
            },
            rate_limit_max_wait: parse_opt::<u64>(&get, "RATE_LIMIT_MAX_WAIT_MS")?
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        };
        governor.validate()?;

        let upstream = UpstreamConfig {
            base_url: get("UPSTREAM_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.upstream.base_url),
            timeout: Duration::from_secs(parse_or(
                &get,
                "UPSTREAM_TIMEOUT_SECS",
                defaults.upstream.timeout.as_secs(),
            )?),
        };
        upstream.validate()?;

        let server = ServerConfig {
            host: get("SERVER_HOST").unwrap_or(defaults.server.host),
            port: parse_or(&get, "SERVER_PORT", defaults.server.port)?,
            inbound_requests_per_minute: parse_opt::<u32>(&get, "INBOUND_REQUESTS_PER_MINUTE")?
                .filter(|rpm| *rpm > 0),
        };

        Ok(Self {
            governor,
            upstream,
            server,
        })
    }
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("invalid value for {}: {}", name, e)))
        })
        .transpose()
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(get, name)?.unwrap_or(default))
}

fn millis_or(get: &impl Fn(&str) -> Option<String>, name: &str, default: Duration) -> Result<Duration> {
    Ok(parse_opt::<u64>(get, name)?
        .map(Duration::from_millis)
        .unwrap_or(default))
}
