//! Bearer credentials for the Box API.
//!
//! The connector only needs two things from a credential source: a current
//! access token, and a way to prove the token can be refreshed (used by the
//! connection test).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use xavyo_connector::error::{ConnectorError, ConnectorResult};

use crate::config::BoxAppSettings;

/// Source of bearer tokens for API calls.
#[async_trait]
pub trait AuthProvider: Send + Sync + std::fmt::Debug {
    /// Get a token usable for the next request.
    async fn access_token(&self) -> ConnectorResult<String>;

    /// Whether this provider can obtain a fresh token on its own.
    fn can_refresh(&self) -> bool;

    /// Obtain a fresh token now, replacing any cached one.
    async fn refresh(&self) -> ConnectorResult<()>;

    /// Drop the cached token after the API rejected it.
    async fn invalidate(&self) {}
}

/// A fixed developer or service token. It cannot be refreshed.
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl AuthProvider for StaticToken {
    async fn access_token(&self) -> ConnectorResult<String> {
        Ok(self.token.expose_secret().to_string())
    }

    fn can_refresh(&self) -> bool {
        false
    }

    async fn refresh(&self) -> ConnectorResult<()> {
        Err(ConnectorError::Security {
            message: "static token cannot be refreshed".to_string(),
        })
    }
}

/// Whose identity a client-credentials token acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSubject {
    /// The enterprise service account.
    Enterprise(String),
    /// A specific managed or app user.
    User(String),
}

impl TokenSubject {
    fn form_fields(&self) -> (&'static str, &str) {
        match self {
            TokenSubject::Enterprise(id) => ("enterprise", id),
            TokenSubject::User(id) => ("user", id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Instant a token granted `expires_in` seconds from now stops being valid.
fn expiry_after(expires_in: i64) -> ConnectorResult<DateTime<Utc>> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| ConnectorError::Serialization {
            message: format!("token response has out-of-range expires_in: {expires_in}"),
        })
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Returns true if the token is expired or will expire within the grace period.
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Client-credentials grant against the Box token endpoint, with a cached
/// token refreshed shortly before expiry.
pub struct ClientCredentials {
    client_id: String,
    client_secret: SecretString,
    subject: TokenSubject,
    token_url: String,
    http_client: reqwest::Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
    grace_period: Duration,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("subject", &self.subject)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl ClientCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        subject: TokenSubject,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            subject,
            token_url: token_url.into(),
            http_client: reqwest::Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
            grace_period: Duration::minutes(5),
        }
    }

    /// Build from a developer-console app settings file, acting as the
    /// enterprise service account.
    pub fn from_app_settings(settings: BoxAppSettings, token_url: impl Into<String>) -> Self {
        Self::new(
            settings.client_id,
            settings.client_secret,
            TokenSubject::Enterprise(settings.enterprise_id),
            token_url,
        )
    }

    #[instrument(skip(self), fields(client_id = %self.client_id))]
    async fn acquire_token(&self) -> ConnectorResult<CachedToken> {
        let (subject_type, subject_id) = self.subject.form_fields();
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("box_subject_type", subject_type),
            ("box_subject_id", subject_id),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed_with_source("token request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::Security {
                message: format!("token request failed with status {status}: {body}"),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            ConnectorError::Serialization {
                message: format!("failed to parse token response: {e}"),
            }
        })?;

        let expires_at = expiry_after(token.expires_in)?;
        debug!(expires_at = %expires_at, "Acquired Box access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl AuthProvider for ClientCredentials {
    async fn access_token(&self) -> ConnectorResult<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache {
                if !token.is_expired(self.grace_period) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("Cached Box token missing or stale, refreshing");
        let token = self.acquire_token().await?;
        let access_token = token.access_token.clone();
        *self.cached_token.write().await = Some(token);
        Ok(access_token)
    }

    fn can_refresh(&self) -> bool {
        true
    }

    async fn refresh(&self) -> ConnectorResult<()> {
        let token = self.acquire_token().await?;
        *self.cached_token.write().await = Some(token);
        Ok(())
    }

    async fn invalidate(&self) {
        *self.cached_token.write().await = None;
    }
}
