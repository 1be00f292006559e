//! # chatgate - Outbound LLM Call Governor
//!
//! This crate sits between a fan chat bot and a third-party text-completion
//! API. Every question passes through a response cache, a daily request
//! quota, a token-bucket rate limiter and a rotating API-key pool before it
//! is sent upstream, and throttled calls are retried with exponential
//! backoff. When no upstream answer can be obtained the bot degrades to a
//! canned keyword-matched answer instead of failing.
//!
//! ## Features
//!
//! - Exact-match response cache with a fixed TTL
//! - Per-model daily quota with lazy reset at the UTC day boundary
//! - Continuously refilling token bucket per model
//! - API key rotation with cooldown and failure exclusion
//! - Retry with exponential backoff on HTTP 429
//! - Tagged `Answer` telling cached, fresh and fallback answers apart
//! - Axum HTTP service (`POST /chat`, `GET /health`, `GET /stats`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use chatgate::config::Config;
//! use chatgate::orchestrator::ChatGovernor;
//! use chatgate::upstream::HttpClient;
//!
//! #[tokio::main]
//! async fn main() -> chatgate::prelude::Result<()> {
//!     let config = Config::from_env()?;
//!     let client = HttpClient::new(&config.upstream)?;
//!     let governor = ChatGovernor::new(client, config.governor)?;
//!
//!     let answer = governor.answer("Quem são os jogadores?").await;
//!     println!("{}", answer.text());
//!     Ok(())
//! }
//! ```

mod error;
pub mod config;
pub mod fallback;
pub mod orchestrator;
pub mod server;
pub mod throttle;
pub mod upstream;

pub use error::Error;
pub use fallback::static_fallback_for;
pub use orchestrator::{Answer, ChatGovernor, FallbackReason, GovernorState};

/// Re-export of common types for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::orchestrator::{Answer, ChatGovernor, FallbackReason};
}
