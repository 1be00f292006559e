//! Upstream completion API
//!
//! The governor talks to the upstream through `CompletionBackend`, so the
//! retry and throttling logic can be exercised without a network.

use std::future::Future;

use crate::error::Result;

mod http;
#[cfg(test)]
pub(crate) mod mock;
mod types;

pub use http::HttpClient;
pub use types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CHAT_COMPLETIONS_PATH, SYSTEM_PROMPT,
};

/// A text-completion service reachable with a per-call API key
///
/// Throttling must be reported as `Error::RateLimit`; every other error is
/// treated as non-retryable by the governor.
pub trait CompletionBackend: Send + Sync {
    fn complete(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> impl Future<Output = Result<String>> + Send;
}
