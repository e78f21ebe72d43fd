//! Box connector configuration
//!
//! Connection settings for the Box Content API plus parsing of the app
//! settings file downloaded from the Box developer console.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use xavyo_connector::error::{ConnectorError, ConnectorResult};

use crate::retry::{LogVerbosity, RetryConfig};

/// Largest page size the Box list endpoints accept.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Configuration for the Box connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxConfig {
    /// Base URL of the Content API (default: `https://api.box.com/2.0`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth2 token endpoint (default: `https://api.box.com/oauth2/token`).
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Page size for list calls (default and maximum: 1000).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retry behavior for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Request/response logging level.
    #[serde(default)]
    pub log_verbosity: LogVerbosity,

    /// Optional outbound HTTP proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

fn default_base_url() -> String {
    "https://api.box.com/2.0".to_string()
}

fn default_token_url() -> String {
    "https://api.box.com/oauth2/token".to_string()
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_url: default_token_url(),
            page_size: default_page_size(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
            log_verbosity: LogVerbosity::default(),
            proxy: None,
        }
    }
}

impl BoxConfig {
    /// Create a configuration pointing at the given API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON, filling in defaults.
    pub fn from_json(json: &str) -> ConnectorResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            ConnectorError::invalid_configuration(format!("malformed Box configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Set the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Set the list page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set connect and request timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, connect_secs: u64, request_secs: u64) -> Self {
        self.connect_timeout_secs = connect_secs;
        self.request_timeout_secs = request_secs;
        self
    }

    /// Set the logging verbosity.
    #[must_use]
    pub fn with_log_verbosity(mut self, verbosity: LogVerbosity) -> Self {
        self.log_verbosity = verbosity;
        self
    }

    /// Route requests through a proxy.
    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        validate_http_url("base_url", &self.base_url)?;
        validate_http_url("token_url", &self.token_url)?;

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConnectorError::invalid_configuration(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConnectorError::invalid_configuration(
                "request_timeout_secs must be positive",
            ));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConnectorError::invalid_configuration(
                "retry.backoff_multiplier must be at least 1.0",
            ));
        }

        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
        }

        Ok(())
    }

    /// Join an API path onto the base URL.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn validate_http_url(field: &str, value: &str) -> ConnectorResult<()> {
    if value.is_empty() {
        return Err(ConnectorError::invalid_configuration(format!(
            "{field} is required"
        )));
    }

    let url = url::Url::parse(value).map_err(|e| {
        ConnectorError::invalid_configuration(format!("invalid {field}: {e}"))
    })?;

    match url.scheme() {
        "https" | "http" => Ok(()),
        other => Err(ConnectorError::invalid_configuration(format!(
            "unsupported scheme for {field}: {other}"
        ))),
    }
}

/// Outbound HTTP proxy settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ProxyConfig {
    /// Create an unauthenticated proxy.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Authenticate against the proxy with basic credentials.
    #[must_use]
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Proxy URL as understood by the HTTP client.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn validate(&self) -> ConnectorResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConnectorError::invalid_configuration(
                "proxy.host is required",
            ));
        }
        if self.port == 0 {
            return Err(ConnectorError::invalid_configuration(
                "proxy.port must be positive",
            ));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConnectorError::invalid_configuration(
                "proxy.password requires proxy.username",
            ));
        }
        Ok(())
    }
}

/// Client credentials extracted from a Box developer-console app settings file.
#[derive(Debug)]
pub struct BoxAppSettings {
    pub client_id: String,
    pub client_secret: SecretString,
    pub enterprise_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAppSettingsFile {
    box_app_settings: RawAppSettings,
    #[serde(rename = "enterpriseID")]
    enterprise_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAppSettings {
    #[serde(rename = "clientID")]
    client_id: String,
    client_secret: String,
}

impl BoxAppSettings {
    /// Parse the JSON app settings file.
    ///
    /// Only the client-credentials fields are read; JWT key material in the
    /// file is ignored.
    pub fn from_json(json: &str) -> ConnectorResult<Self> {
        let raw: RawAppSettingsFile = serde_json::from_str(json).map_err(|e| {
            ConnectorError::invalid_configuration(format!("malformed Box app settings: {e}"))
        })?;

        let enterprise_id = raw
            .enterprise_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                ConnectorError::invalid_configuration("Box app settings have no enterpriseID")
            })?;

        if raw.box_app_settings.client_id.trim().is_empty() {
            return Err(ConnectorError::invalid_configuration(
                "Box app settings have no clientID",
            ));
        }

        Ok(Self {
            client_id: raw.box_app_settings.client_id,
            client_secret: SecretString::from(raw.box_app_settings.client_secret),
            enterprise_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_config_is_valid() {
        let config = BoxConfig::default();
        assert_eq!(config.base_url, "https://api.box.com/2.0");
        assert_eq!(config.page_size, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = BoxConfig::from_json(
            r#"{"base_url": "https://box.example.com/2.0", "retry": {"max_retries": 1}}"#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://box.example.com/2.0");
        assert_eq!(config.token_url, "https://api.box.com/oauth2/token");
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.log_verbosity, LogVerbosity::Normal);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_url = BoxConfig::new("not a url");
        assert!(matches!(
            bad_url.validate(),
            Err(ConnectorError::InvalidConfiguration { .. })
        ));

        let bad_scheme = BoxConfig::new("ftp://api.box.com");
        assert!(bad_scheme.validate().is_err());

        let too_big = BoxConfig::default().with_page_size(5000);
        assert!(too_big.validate().is_err());

        let zero = BoxConfig::default().with_page_size(0);
        assert!(zero.validate().is_err());

        let bad_proxy = BoxConfig::default().with_proxy(ProxyConfig::new("", 3128));
        assert!(bad_proxy.validate().is_err());
    }

    #[test]
    fn test_endpoint_join() {
        let config = BoxConfig::new("https://api.box.com/2.0/");
        assert_eq!(config.endpoint("/users/1"), "https://api.box.com/2.0/users/1");
        assert_eq!(config.endpoint("groups"), "https://api.box.com/2.0/groups");
    }

    #[test]
    fn test_proxy_debug_redacts_password() {
        let proxy = ProxyConfig::new("proxy.internal", 3128).with_basic_auth("svc", "hunter2");
        let debug = format!("{proxy:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(proxy.url(), "http://proxy.internal:3128");
    }

    #[test]
    fn test_config_debug_redacts_proxy_password() {
        let config = BoxConfig::default()
            .with_proxy(ProxyConfig::new("proxy.internal", 3128).with_basic_auth("svc", "hunter2"));
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("proxy.internal"));
    }

    #[test]
    fn test_proxy_password_not_serialized() {
        let config = BoxConfig::default()
            .with_proxy(ProxyConfig::new("proxy.internal", 3128).with_basic_auth("svc", "hunter2"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_app_settings_parse() {
        let settings = BoxAppSettings::from_json(
            r#"{
                "boxAppSettings": {
                    "clientID": "abc123",
                    "clientSecret": "s3cr3t",
                    "appAuth": {"publicKeyID": "", "privateKey": "", "passphrase": ""}
                },
                "enterpriseID": "998877"
            }"#,
        )
        .unwrap();

        assert_eq!(settings.client_id, "abc123");
        assert_eq!(settings.client_secret.expose_secret(), "s3cr3t");
        assert_eq!(settings.enterprise_id, "998877");
        assert!(!format!("{settings:?}").contains("s3cr3t"));
    }

    #[test]
    fn test_app_settings_require_enterprise() {
        let err = BoxAppSettings::from_json(
            r#"{"boxAppSettings": {"clientID": "abc", "clientSecret": "x"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
