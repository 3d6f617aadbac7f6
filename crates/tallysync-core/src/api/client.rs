//! API client for the dashboard's REST backend.
//!
//! `ResourceApi` is what the sync layer depends on; `HttpApiClient` is the
//! production implementation over reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::{ApiError, ApiResponse};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// The verbs the sync layer consumes.
///
/// Non-2xx statuses are returned as an `ApiResponse`, not an error: callers
/// branch on `status` (401 in particular). `Err` is reserved for requests
/// that never produced a response.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<ApiResponse, ApiError>;

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError>;

    async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError>;

    async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError>;
}

/// Clone is cheap - reqwest::Client and the token are both behind Arc.
#[derive(Clone)]
pub struct HttpApiClient {
    client: Client,
    base_url: Arc<String>,
    token: Option<Arc<String>>,
}

impl HttpApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: Arc::new(base_url.trim_end_matches('/').to_string()),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: impl Into<Arc<String>>) {
        self.token = Some(token.into());
    }

    /// Create a new client with the given token, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: Arc::clone(&self.base_url),
            token: Some(Arc::new(token.into())),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(header::ACCEPT, "application/json");
        match self.token {
            Some(ref token) => request.bearer_auth(token.as_str()),
            None => request,
        }
    }

    /// Send a request, backing off and retrying on 429.
    ///
    /// `build` is called once per attempt because a `RequestBuilder` is
    /// consumed by `send`.
    async fn send(&self, url: &str, build: impl Fn() -> RequestBuilder) -> Result<ApiResponse, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.authorize(build()).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            let text = response.text().await?;
            debug!(url = url, status = status.as_u16(), bytes = text.len(), "Response received");
            return Ok(ApiResponse::new(status.as_u16(), Self::decode_body(text)));
        }
    }

    /// JSON bodies are decoded; anything else is kept as a string so error
    /// bodies still reach `ApiError::from_status`.
    fn decode_body(text: String) -> Value {
        if text.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    }
}

#[async_trait]
impl ResourceApi for HttpApiClient {
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<ApiResponse, ApiError> {
        let url = self.url(path);
        self.send(&url, || self.client.get(&url).query(params)).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError> {
        let url = self.url(path);
        self.send(&url, || self.client.post(&url).json(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError> {
        let url = self.url(path);
        self.send(&url, || self.client.put(&url).json(body)).await
    }

    async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        let url = self.url(path);
        self.send(&url, || self.client.delete(&url)).await
    }
}
