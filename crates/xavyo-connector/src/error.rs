//! Connector Framework error types
//!
//! The typed failure taxonomy surfaced to the host, with transient/permanent
//! classification for retry decisions.

use thiserror::Error;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (transient)
    /// The remote system could not be reached at all.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The remote system asked for the request to be reissued later
    /// (rate limiting, optimistic concurrency, server overload).
    #[error("retryable failure{}: {message}", status_suffix(.status))]
    Retryable { status: Option<u16>, message: String },

    // Credential errors (permanent)
    /// The credential was rejected or has been revoked.
    #[error("security error: {message}")]
    Security { message: String },

    /// The credential is valid but lacks the rights for the operation.
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    // Object errors (permanent)
    /// An object with the same identity already exists.
    #[error("object already exists: {identifier}")]
    AlreadyExists { identifier: String },

    /// The referenced object does not exist.
    #[error("unknown uid: {uid}")]
    UnknownUid { uid: String },

    /// An attribute is unknown, not writable, or carries a badly shaped value.
    #[error("invalid attribute '{attribute}': {message}")]
    InvalidAttribute { attribute: String, message: String },

    /// A required attribute is missing or blank.
    #[error("missing required attribute '{attribute}'")]
    MissingRequiredAttribute { attribute: String },

    /// The object class is not handled by this connector.
    #[error("unsupported object class: {object_class}")]
    UnsupportedObjectClass { object_class: String },

    // Configuration errors (permanent)
    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A remote failure that matches no known category, passed through with
    /// the original detail.
    #[error("unclassified remote failure (status {status:?}, code {code:?}): {message}")]
    Unclassified {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl ConnectorError {
    /// Check if this error is transient and the operation should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. } | ConnectorError::Retryable { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::Retryable { .. } => "RETRYABLE",
            ConnectorError::Security { .. } => "SECURITY_ERROR",
            ConnectorError::PermissionDenied { .. } => "PERMISSION_DENIED",
            ConnectorError::AlreadyExists { .. } => "ALREADY_EXISTS",
            ConnectorError::UnknownUid { .. } => "UNKNOWN_UID",
            ConnectorError::InvalidAttribute { .. } => "INVALID_ATTRIBUTE",
            ConnectorError::MissingRequiredAttribute { .. } => "MISSING_REQUIRED_ATTRIBUTE",
            ConnectorError::UnsupportedObjectClass { .. } => "UNSUPPORTED_OBJECT_CLASS",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::Unclassified { .. } => "UNCLASSIFIED",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid attribute error.
    pub fn invalid_attribute(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::InvalidAttribute {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Create a missing required attribute error.
    pub fn missing_required(attribute: impl Into<String>) -> Self {
        ConnectorError::MissingRequiredAttribute {
            attribute: attribute.into(),
        }
    }

    /// Create an unknown uid error.
    pub fn unknown_uid(uid: impl Into<String>) -> Self {
        ConnectorError::UnknownUid { uid: uid.into() }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let transient_errors = vec![
            ConnectorError::connection_failed("test"),
            ConnectorError::Retryable {
                status: Some(429),
                message: "rate limited".to_string(),
            },
        ];

        for err in transient_errors {
            assert!(
                err.is_transient(),
                "Expected {} to be transient",
                err.error_code()
            );
            assert!(
                !err.is_permanent(),
                "Expected {} to not be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_permanent_errors() {
        let permanent_errors = vec![
            ConnectorError::Security {
                message: "token revoked".to_string(),
            },
            ConnectorError::PermissionDenied {
                message: "test".to_string(),
            },
            ConnectorError::AlreadyExists {
                identifier: "ceo@example.com".to_string(),
            },
            ConnectorError::unknown_uid("11446498"),
            ConnectorError::invalid_attribute("role", "bad value"),
            ConnectorError::missing_required("__NAME__"),
            ConnectorError::Unclassified {
                status: Some(418),
                code: None,
                message: "teapot".to_string(),
            },
        ];

        for err in permanent_errors {
            assert!(
                err.is_permanent(),
                "Expected {} to be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ConnectorError::unknown_uid("1").error_code(),
            "UNKNOWN_UID"
        );
        assert_eq!(
            ConnectorError::missing_required("name").error_code(),
            "MISSING_REQUIRED_ATTRIBUTE"
        );
        assert_eq!(
            ConnectorError::invalid_configuration("x").error_code(),
            "INVALID_CONFIG"
        );
    }

    #[test]
    fn test_error_display() {
        let err = ConnectorError::Retryable {
            status: Some(503),
            message: "service unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "retryable failure (status 503): service unavailable"
        );

        let err = ConnectorError::Retryable {
            status: None,
            message: "blocked".to_string(),
        };
        assert_eq!(err.to_string(), "retryable failure: blocked");

        let err = ConnectorError::invalid_attribute("space_amount", "expected a long");
        assert_eq!(
            err.to_string(),
            "invalid attribute 'space_amount': expected a long"
        );
    }

    #[test]
    fn test_error_with_source() {
        let source_err = std::io::Error::new(std::io::ErrorKind::Other, "underlying error");
        let err = ConnectorError::connection_failed_with_source("failed", source_err);

        assert!(err.is_transient());
        if let ConnectorError::ConnectionFailed { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("Expected ConnectionFailed variant");
        }
    }
}
