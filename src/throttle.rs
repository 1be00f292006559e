//! # Throttling Primitives
//!
//! The leaf components of the outbound call governor. Each one owns its own
//! state behind a short-lived lock and never holds it across a sleep.
//!
//! ## Key Components
//!
//! - `ResponseCache`: exact-match query cache with a fixed TTL
//! - `DailyRequestCounter`: per-model daily quota with lazy UTC reset
//! - `TokenBucket`: requests-per-minute smoothing, one bucket per model
//! - `ApiKeyPool`: key rotation with cooldown and failure exclusion
//!
//! Limiting is best-effort: concurrent callers that observe a free token or
//! key at the same moment may both proceed.

pub mod daily_counter;
pub mod key_pool;
pub mod response_cache;
pub mod token_bucket;

pub use daily_counter::DailyRequestCounter;
pub use key_pool::{mask_key, ApiKeyPool, KeyPoolOptions, KeyStatus};
pub use response_cache::{CachedResponse, ResponseCache};
pub use token_bucket::TokenBucket;
