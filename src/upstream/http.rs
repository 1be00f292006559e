//! HTTP client for the upstream completion API
//!
//! Bearer-authenticated JSON POSTs with a fixed per-request timeout. The key
//! is supplied per call because the governor rotates keys between attempts.

use std::time::Duration;

use reqwest::{Client as ReqwestClient, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, instrument};
use url::Url;

use super::types::{ChatCompletionRequest, ChatCompletionResponse, CHAT_COMPLETIONS_PATH};
use super::CompletionBackend;
use crate::config::UpstreamConfig;
use crate::error::{Error, Result};

/// HTTP client for making requests to the completion API
#[derive(Clone)]
pub struct HttpClient {
    /// The underlying reqwest client
    client: ReqwestClient,

    /// Scheme and host of the API
    base_url: String,
}

impl HttpClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        Self::with_base_url(config.base_url.clone(), config.timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = ReqwestClient::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        let url = format!("{}/{}", self.base_url, path);
        Url::parse(&url).map_err(|e| Error::Other(format!("Invalid URL: {}", e)))
    }

    /// POST a JSON body authenticated with `api_key`
    #[instrument(skip(self, api_key, body), level = "debug")]
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, api_key: &str, body: &B) -> Result<T> {
        let url = self.build_url(path)?;
        let request = self.client.post(url).bearer_auth(api_key).json(body);

        debug!("Sending POST request to {}", path);
        self.execute_request(request).await
    }

    async fn execute_request<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            let response_text = response.text().await?;
            error!("API error: {} - {}", status, response_text);
            return Err(Error::RateLimit { retry_after_secs });
        }

        let response_text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&response_text).map_err(|e| {
                error!("Failed to parse response: {}", e);
                Error::UnexpectedResponse(format!("Failed to parse response: {}", e))
            })
        } else {
            error!("API error: {} - {}", status, response_text);

            if status == StatusCode::UNAUTHORIZED {
                Err(Error::Auth("Invalid API key or credentials".to_string()))
            } else {
                Err(Error::Api {
                    status_code: status.as_u16(),
                    message: response_text,
                })
            }
        }
    }
}

impl CompletionBackend for HttpClient {
    async fn complete(&self, api_key: &str, request: &ChatCompletionRequest) -> Result<String> {
        let response: ChatCompletionResponse = self.post(CHAT_COMPLETIONS_PATH, api_key, request).await?;
        response.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelLimits;
    use mockito::{Matcher, Server};

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest::for_query("gpt-3.5-turbo", &ModelLimits::new(3, 200, 4096), "oi")
    }

    #[tokio::test]
    async fn test_completion_success() {
        let mut server = Server::new_async().await;
        let mock_server = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 2048,
                "temperature": 0.1,
                "top_p": 0.1,
                "frequency_penalty": 0.5,
                "presence_penalty": 0.0,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Olá, torcedor!"}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = HttpClient::with_base_url(server.url(), Duration::from_secs(10)).unwrap();
        let text = client.complete("test-key", &request()).await.unwrap();
        assert_eq!(text, "Olá, torcedor!");

        mock_server.assert_async().await;
    }

    #[tokio::test]
    async fn test_throttled_response() {
        let mut server = Server::new_async().await;
        let mock_server = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_header("retry-after", "7")
            .with_body(r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#)
            .create_async()
            .await;

        let client = HttpClient::with_base_url(server.url(), Duration::from_secs(10)).unwrap();
        let result = client.complete("test-key", &request()).await;
        assert!(matches!(result, Err(Error::RateLimit { retry_after_secs: 7 })));
        assert!(result.unwrap_err().is_retryable());

        mock_server.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let mut server = Server::new_async().await;
        let unauthorized = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer bad-key")
            .with_status(401)
            .with_body("Unauthorized")
            .create_async()
            .await;
        let unavailable = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let client = HttpClient::with_base_url(server.url(), Duration::from_secs(10)).unwrap();

        let result = client.complete("bad-key", &request()).await;
        assert!(matches!(result, Err(Error::Auth(_))));

        let result = client.complete("test-key", &request()).await;
        assert!(matches!(result, Err(Error::Api { status_code: 503, .. })));
        assert!(!result.unwrap_err().is_retryable());

        unauthorized.assert_async().await;
        unavailable.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client = HttpClient::with_base_url(format!("{}/", server.url()), Duration::from_secs(10)).unwrap();
        let result = client.complete("test-key", &request()).await;
        assert!(matches!(result, Err(Error::UnexpectedResponse(_))));
    }

    #[tokio::test]
    async fn test_unparseable_success_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let client = HttpClient::with_base_url(server.url(), Duration::from_secs(10)).unwrap();
        let result = client.complete("test-key", &request()).await;
        assert!(matches!(result, Err(Error::UnexpectedResponse(_))));
        assert!(!result.unwrap_err().is_retryable());
    }
}
