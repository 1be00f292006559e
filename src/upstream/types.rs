//! Wire types for the OpenAI-compatible chat completion endpoint.

use serde::{Deserialize, Serialize};

use crate::config::ModelLimits;
use crate::error::{Error, Result};

/// Instruction sent as the first message of every conversation
pub const SYSTEM_PROMPT: &str = "Você é o assistente oficial de uma organização brasileira de esports. \
Responda sempre em português, de forma curta, simpática e precisa, apenas sobre a organização, \
seus times, jogadores, campeonatos e torcida. Se não souber a resposta, diga que não sabe.";

/// Path of the completion endpoint relative to the base URL
pub const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user" or "assistant"
    pub role: String,

    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for a chat completion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl ChatCompletionRequest {
    /// System instruction plus the fan's question, with conservative sampling
    pub fn for_query(model: impl Into<String>, limits: &ModelLimits, query: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(query)],
            max_tokens: limits.max_tokens_per_request / 2,
            temperature: 0.1,
            top_p: 0.1,
            frequency_penalty: 0.5,
            presence_penalty: 0.0,
        }
    }

    /// Text of the last user message
    pub fn query(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == "user")
            .map(|message| message.content.as_str())
    }
}

/// Response body of a chat completion
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// `choices[0].message.content`
    pub fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::UnexpectedResponse("Missing choices[0].message.content".to_string()))
    }
}
