//! # HTTP Service
//!
//! Axum router exposing the governor to the fan app.
//!
//! - `POST /chat` `{query}` -> `200 {content}` or `200 {content, isFallback: true}`;
//!   `400 {error}` for a missing query or malformed body; `500 {error, message}`
//!   when answering crashes
//! - `GET /health` -> `200 {status: "ok"}`
//! - `GET /stats` -> quota, cache, limiter and key pool state
//!
//! Each question is answered on its own task so a client that disconnects
//! does not cancel an in-flight retry loop.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::orchestrator::ChatGovernor;
use crate::throttle::KeyStatus;
use crate::upstream::CompletionBackend;

/// Shared state for all handlers
pub struct AppState<B> {
    pub governor: Arc<ChatGovernor<B>>,
    /// Global cap on incoming chat requests
    pub inbound_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            governor: self.governor.clone(),
            inbound_limiter: self.inbound_limiter.clone(),
        }
    }
}

impl<B> AppState<B> {
    pub fn new(governor: ChatGovernor<B>) -> Self {
        Self {
            governor: Arc::new(governor),
            inbound_limiter: None,
        }
    }

    /// Reject chat requests beyond `requests_per_minute` across all clients
    pub fn with_inbound_limit(mut self, requests_per_minute: Option<u32>) -> Self {
        self.inbound_limiter = requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| Arc::new(RateLimiter::direct(Quota::per_minute(rpm))));
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(rename = "isFallback", skip_serializing_if = "Option::is_none")]
    pub is_fallback: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub model: String,
    pub daily_count: u64,
    pub daily_limit: u64,
    pub cache_entries: usize,
    pub available_tokens: f64,
    pub keys: Vec<KeyStatus>,
}

/// Error responses of the HTTP layer
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    TooManyRequests,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "Too many requests" })),
            )
                .into_response(),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error", "message": message })),
            )
                .into_response(),
        }
    }
}

async fn chat<B>(
    State(state): State<AppState<B>>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<Json<ChatResponse>, ApiError>
where
    B: CompletionBackend + 'static,
{
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let query = request
        .query
        .filter(|query| !query.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Query is required".to_string()))?;

    if let Some(limiter) = &state.inbound_limiter {
        if limiter.check().is_err() {
            warn!("Inbound chat limit reached");
            return Err(ApiError::TooManyRequests);
        }
    }

    let governor = state.governor.clone();
    let answer = tokio::spawn(async move { governor.answer(&query).await })
        .await
        .map_err(|e| {
            error!("Chat task failed: {}", e);
            ApiError::Internal(e.to_string())
        })?;

    let is_fallback = answer.is_fallback().then_some(true);
    Ok(Json(ChatResponse {
        content: answer.into_text(),
        is_fallback,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats<B>(State(state): State<AppState<B>>) -> Json<StatsResponse>
where
    B: CompletionBackend + 'static,
{
    let governor = &state.governor;
    let governor_state = governor.state();
    let available_tokens = match governor.limiter() {
        Some(limiter) => limiter.available_tokens().await,
        None => 0.0,
    };
    let keys = match &governor_state.keys {
        Some(pool) => pool.snapshot().await,
        None => Vec::new(),
    };
    Json(StatsResponse {
        model: governor.model().to_string(),
        daily_count: governor_state.daily.count().await,
        daily_limit: governor.limits().requests_per_day,
        cache_entries: governor_state.cache.len().await,
        available_tokens,
        keys,
    })
}

/// Build the router with all routes
pub fn build_router<B>(state: AppState<B>) -> Router
where
    B: CompletionBackend + 'static,
{
    Router::new()
        .route("/chat", post(chat::<B>))
        .route("/health", get(health))
        .route("/stats", get(stats::<B>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process stops
pub async fn serve<B>(config: &ServerConfig, state: AppState<B>) -> Result<()>
where
    B: CompletionBackend + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid server address: {}", e)))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GovernorConfig, ModelCatalog, ModelLimits};
    use crate::fallback::Topic;
    use crate::upstream::mock::{MockBackend, MockOutcome};
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn state(keys: &[&str], backend: MockBackend) -> AppState<MockBackend> {
        let config = GovernorConfig {
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            model: "test-model".to_string(),
            catalog: ModelCatalog::empty().with_model("test-model", ModelLimits::new(60, 200, 1000)),
            key_cooldown: Duration::ZERO,
            ..GovernorConfig::default()
        };
        AppState::new(ChatGovernor::new(backend, config).unwrap())
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_upstream_answer() {
        let backend = MockBackend::with_script([MockOutcome::Text("Olá, torcedor!".to_string())]);
        let app = build_router(state(&["sk-test"], backend));

        let resp = app.oneshot(chat_request(r#"{"query":"oi"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body, json!({ "content": "Olá, torcedor!" }));
    }

    #[tokio::test]
    async fn test_chat_fallback_without_keys() {
        let app = build_router(state(&[], MockBackend::new()));

        let resp = app.oneshot(chat_request(r#"{"query":"oi"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["content"], Topic::Greeting.message());
        assert_eq!(body["isFallback"], true);
    }

    #[tokio::test]
    async fn test_chat_requires_query() {
        let app = build_router(state(&[], MockBackend::new()));

        let resp = app.clone().oneshot(chat_request("{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"].is_string());

        let resp = app.clone().oneshot(chat_request(r#"{"query":""}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.oneshot(chat_request("not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_internal_failure() {
        let backend = MockBackend::with_script([MockOutcome::Panic]);
        let app = build_router(state(&["sk-test"], backend));

        let resp = app.oneshot(chat_request(r#"{"query":"oi"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(resp).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_inbound_limit() {
        let app = build_router(state(&[], MockBackend::new()).with_inbound_limit(Some(1)));

        let resp = app.clone().oneshot(chat_request(r#"{"query":"oi"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.oneshot(chat_request(r#"{"query":"oi"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_health_and_stats() {
        let app = build_router(state(&["sk-1234567890"], MockBackend::new()));

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(chat_request(r#"{"query":"quem são os jogadores?"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["dailyCount"], 1);
        assert_eq!(body["dailyLimit"], 200);
        assert_eq!(body["cacheEntries"], 1);
        assert_eq!(body["keys"][0]["key"], "****7890");
        assert_eq!(body["keys"][0]["failureCount"], 0);
    }
}
