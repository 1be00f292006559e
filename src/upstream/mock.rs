//! Scripted completion backend for tests.
//!
//! Replays queued outcomes in order and records every call it receives.
//! Once the script runs out it answers with a fixed text.

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{ChatCompletionRequest, CompletionBackend};
use crate::error::{Error, Result};

/// What the next call returns
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Text(String),
    Throttled,
    Status(u16),
    Panic,
}

/// A call seen by the mock
#[derive(Debug, Clone)]
pub struct MockCall {
    pub api_key: String,
    pub query: String,
    pub max_tokens: u32,
    pub at: Instant,
}

#[derive(Debug, Default)]
pub struct MockBackend {
    script: Mutex<VecDeque<MockOutcome>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockBackend {
    pub const DEFAULT_TEXT: &'static str = "resposta do modelo";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

impl CompletionBackend for MockBackend {
    async fn complete(&self, api_key: &str, request: &ChatCompletionRequest) -> Result<String> {
        self.calls.lock().await.push(MockCall {
            api_key: api_key.to_string(),
            query: request.query().unwrap_or_default().to_string(),
            max_tokens: request.max_tokens,
            at: Instant::now(),
        });

        let outcome = self.script.lock().await.pop_front();
        match outcome {
            None => Ok(Self::DEFAULT_TEXT.to_string()),
            Some(MockOutcome::Text(text)) => Ok(text),
            Some(MockOutcome::Throttled) => Err(Error::RateLimit { retry_after_secs: 0 }),
            Some(MockOutcome::Status(status_code)) => Err(Error::Api {
                status_code,
                message: "mock failure".to_string(),
            }),
            Some(MockOutcome::Panic) => panic!("mock backend panicked"),
        }
    }
}
