//! Remote API client boundary.
//!
//! [`RemoteApi`] is the only way the connector reaches Box. The production
//! implementation, [`HttpRemoteClient`], adds bearer authentication, bounded
//! retries with backoff, and connection reuse on top of `reqwest`.

use async_trait::async_trait;
use reqwest::header;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};
use xavyo_connector::error::{ConnectorError, ConnectorResult};

use crate::auth::AuthProvider;
use crate::config::BoxConfig;
use crate::retry::parse_retry_after;

/// HTTP methods used against the Box API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call against the API, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RemoteRequest {
    fn new(method: HttpMethod, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path, Some(body))
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path, Some(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path, None)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// First value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A successful response. `body` is `Value::Null` when the API returned no content.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Value,
}

impl RemoteResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

/// Failure of a remote call, before classification.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The API answered with a non-success status.
    #[error("Box API error {status} ({}): {message}", code.as_deref().unwrap_or("no code"))]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
        raw_body: String,
    },

    /// The request never produced an HTTP response.
    #[error("transport failure: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A success response whose body is not JSON.
    #[error("malformed response body (status {status}): {message}")]
    MalformedResponse { status: u16, message: String },

    /// No bearer token could be obtained.
    #[error("credential unavailable: {0}")]
    Credential(#[source] ConnectorError),
}

impl RemoteError {
    /// Build a status error from a raw Box error body.
    ///
    /// Box error bodies look like
    /// `{"type":"error","status":409,"code":"conflict","message":"..."}`.
    pub fn from_response(status: u16, raw_body: impl Into<String>) -> Self {
        let raw_body = raw_body.into();
        let parsed = serde_json::from_str::<Value>(&raw_body).ok();
        let code = parsed
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map_or_else(|| raw_body.clone(), str::to_string);

        RemoteError::Status {
            status,
            code,
            message,
            raw_body,
        }
    }

    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RemoteError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// HTTP status, when the API answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } | RemoteError::MalformedResponse { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Machine-readable Box error code.
    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Executes calls against the Box API.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn invoke(&self, request: RemoteRequest) -> Result<RemoteResponse, RemoteError>;
}

/// Walks an offset-paged Box collection (`entries`, `total_count`).
pub(crate) struct Pager<'a> {
    api: &'a dyn RemoteApi,
    request: RemoteRequest,
    limit: u32,
    offset: u64,
    done: bool,
}

impl<'a> Pager<'a> {
    pub(crate) fn new(api: &'a dyn RemoteApi, request: RemoteRequest, limit: u32) -> Self {
        Self {
            api,
            request,
            limit: limit.max(1),
            offset: 0,
            done: false,
        }
    }

    /// Fetch the next page, or `None` once the collection is exhausted.
    pub(crate) async fn next_page(&mut self) -> Result<Option<Vec<Value>>, RemoteError> {
        if self.done {
            return Ok(None);
        }

        let request = self
            .request
            .clone()
            .with_query("limit", self.limit)
            .with_query("offset", self.offset);
        let mut body = self.api.invoke(request).await?.body;

        let total = body.get("total_count").and_then(Value::as_u64);
        let entries = match body.get_mut("entries").map(Value::take) {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };

        self.offset += entries.len() as u64;
        self.done = entries.len() < self.limit as usize
            || total.is_some_and(|total| self.offset >= total);

        debug!(
            path = %self.request.path,
            fetched = entries.len(),
            offset = self.offset,
            total = ?total,
            "Fetched page"
        );
        Ok(Some(entries))
    }
}

/// `reqwest`-backed [`RemoteApi`].
pub struct HttpRemoteClient {
    config: BoxConfig,
    client: reqwest::Client,
    auth: Arc<dyn AuthProvider>,
}

impl std::fmt::Debug for HttpRemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteClient")
            .field("base_url", &self.config.base_url)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteClient {
    pub fn new(config: BoxConfig, auth: Arc<dyn AuthProvider>) -> ConnectorResult<Self> {
        config.validate()?;
        let client = Self::build_client(&config)?;
        Ok(Self {
            config,
            client,
            auth,
        })
    }

    fn build_client(config: &BoxConfig) -> ConnectorResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(concat!("xavyo-connector-box/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy_config) = &config.proxy {
            let mut proxy = reqwest::Proxy::all(proxy_config.url()).map_err(|e| {
                ConnectorError::invalid_configuration(format!("invalid proxy: {e}"))
            })?;
            if let (Some(username), Some(password)) = (&proxy_config.username, &proxy_config.password)
            {
                proxy = proxy.basic_auth(username, password);
            }
            builder = builder.proxy(proxy);
        }

        builder.build().map_err(|e| {
            ConnectorError::invalid_configuration(format!("failed to build HTTP client: {e}"))
        })
    }

    fn retry_wait(&self, response: &reqwest::Response, status: u16, attempt: u32) -> Duration {
        let retry_after = if status == 429 {
            response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
        } else {
            None
        };
        retry_after.unwrap_or_else(|| self.config.retry.calculate_backoff(attempt))
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteClient {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn invoke(&self, request: RemoteRequest) -> Result<RemoteResponse, RemoteError> {
        let url = self.config.endpoint(&request.path);
        let retry = &self.config.retry;
        let verbosity = self.config.log_verbosity;
        let mut attempt: u32 = 0;
        let mut reauthenticated = false;

        loop {
            attempt += 1;

            let token = self
                .auth
                .access_token()
                .await
                .map_err(RemoteError::Credential)?;

            let mut builder = self
                .client
                .request(request.method.as_reqwest(), &url)
                .bearer_auth(token)
                .query(&request.query);
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            if verbosity.is_enabled() {
                debug!(url = %url, attempt = attempt, "Sending Box request");
            }
            if verbosity.log_query() && !request.query.is_empty() {
                debug!(query = ?request.query, "Request query");
            }
            if verbosity.log_bodies() {
                if let Some(body) = &request.body {
                    trace!(body = %body, "Request body");
                }
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    if attempt <= retry.max_retries {
                        let backoff = retry.calculate_backoff(attempt);
                        warn!(
                            url = %url,
                            error = %e,
                            attempt = attempt,
                            wait_ms = backoff.as_millis() as u64,
                            "Request failed, retrying with backoff"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(RemoteError::transport(
                        format!("request to {url} failed after {attempt} attempts"),
                        e,
                    ));
                }
            };

            let status = response.status().as_u16();
            if verbosity.is_enabled() {
                debug!(url = %url, status = status, attempt = attempt, "Received Box response");
            }

            // A rejected token gets one refresh that does not consume a retry.
            if status == 401 && !reauthenticated && self.auth.can_refresh() {
                reauthenticated = true;
                attempt -= 1;
                warn!(url = %url, "Access token rejected, refreshing and retrying once");
                self.auth.invalidate().await;
                continue;
            }

            if retry.should_retry(status) && attempt <= retry.max_retries {
                let wait = self.retry_wait(&response, status, attempt);
                warn!(
                    url = %url,
                    status = status,
                    attempt = attempt,
                    wait_ms = wait.as_millis() as u64,
                    "Transient Box response, waiting before retry"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let text = response
                .text()
                .await
                .map_err(|e| RemoteError::transport("failed to read response body", e))?;
            if verbosity.log_bodies() {
                trace!(body = %text, "Response body");
            }

            if (200..300).contains(&status) {
                if attempt > 1 {
                    debug!(url = %url, attempts = attempt, "Request succeeded after retries");
                }
                let body = if text.trim().is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&text).map_err(|e| RemoteError::MalformedResponse {
                        status,
                        message: e.to_string(),
                    })?
                };
                return Ok(RemoteResponse { status, body });
            }

            if attempt > 1 && retry.should_retry(status) {
                warn!(url = %url, status = status, attempts = attempt, "Retries exhausted");
            }
            return Err(RemoteError::from_response(status, text));
        }
    }
}
