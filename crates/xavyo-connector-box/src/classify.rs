//! Remote failure classification.
//!
//! Every remote failure is classified exactly once, where the call result is
//! received. Callers either tolerate a specific kind (a conflict while adding
//! a membership, say) or convert it into the matching [`ConnectorError`].
//!
//! See <https://developer.box.com/guides/api-calls/permissions-and-errors/common-errors/>.

use serde_json::Value;
use tracing::debug;
use xavyo_connector::error::ConnectorError;

use crate::client::RemoteError;

/// Box error code for a conflict that clears up on its own.
const OPERATION_BLOCKED_TEMPORARY: &str = "operation_blocked_temporary";

/// The kind of remote resource a call targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    User,
    Group,
    Membership,
    EmailAlias,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::Group => "group",
            ResourceKind::Membership => "group_membership",
            ResourceKind::EmailAlias => "email_alias",
        }
    }
}

/// The kind of call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    Create,
    Read,
    List,
    Update,
    Delete,
}

/// Typed outcome of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    AlreadyExists,
    NotFound,
    SecurityError,
    PermissionDenied,
    InvalidAttribute,
    Retryable,
    Unclassified,
}

/// Map an HTTP status and Box error code to a failure kind.
///
/// 409 is the only ambiguous status: it means "already exists" when creating
/// or updating (adding an alias or a membership is a create), a transient
/// lock when the code is `operation_blocked_temporary`, and nothing in
/// particular anywhere else.
pub fn classify(
    status: u16,
    code: Option<&str>,
    resource: ResourceKind,
    operation: RemoteOperation,
) -> FailureKind {
    let kind = match status {
        412 | 429 | 500 | 502 | 503 => FailureKind::Retryable,
        409 if code == Some(OPERATION_BLOCKED_TEMPORARY) => FailureKind::Retryable,
        409 => match operation {
            RemoteOperation::Create | RemoteOperation::Update => FailureKind::AlreadyExists,
            _ => FailureKind::Unclassified,
        },
        404 => FailureKind::NotFound,
        401 | 410 => FailureKind::SecurityError,
        403 => FailureKind::PermissionDenied,
        400 | 405 | 411 | 413 | 415 => FailureKind::InvalidAttribute,
        _ => FailureKind::Unclassified,
    };

    debug!(
        status = status,
        code = code.unwrap_or(""),
        resource = resource.as_str(),
        operation = ?operation,
        kind = ?kind,
        "Classified remote failure"
    );
    kind
}

/// Classify a remote error. `None` when the API never answered with a status.
pub fn kind_of(
    error: &RemoteError,
    resource: ResourceKind,
    operation: RemoteOperation,
) -> Option<FailureKind> {
    match error {
        RemoteError::Status { status, code, .. } => {
            Some(classify(*status, code.as_deref(), resource, operation))
        }
        _ => None,
    }
}

/// Convert a remote error into the typed connector error.
///
/// `identifier` names the object the call was about (an id or a login) and
/// ends up in `AlreadyExists` and `UnknownUid`.
pub fn to_connector_error(
    error: RemoteError,
    resource: ResourceKind,
    operation: RemoteOperation,
    identifier: &str,
) -> ConnectorError {
    match error {
        RemoteError::Status {
            status,
            code,
            message,
            raw_body,
        } => match classify(status, code.as_deref(), resource, operation) {
            FailureKind::AlreadyExists => ConnectorError::AlreadyExists {
                identifier: identifier.to_string(),
            },
            FailureKind::NotFound => ConnectorError::unknown_uid(identifier),
            FailureKind::SecurityError => ConnectorError::Security {
                message: format!("{status}: {message}"),
            },
            FailureKind::PermissionDenied => ConnectorError::PermissionDenied { message },
            FailureKind::InvalidAttribute => ConnectorError::InvalidAttribute {
                attribute: offending_field(&raw_body)
                    .unwrap_or_else(|| resource.as_str().to_string()),
                message,
            },
            FailureKind::Retryable => ConnectorError::Retryable {
                status: Some(status),
                message,
            },
            FailureKind::Unclassified => ConnectorError::Unclassified {
                status: Some(status),
                code,
                message,
            },
        },
        RemoteError::Transport { message, source } => {
            ConnectorError::ConnectionFailed { message, source }
        }
        RemoteError::MalformedResponse { status, message } => ConnectorError::Serialization {
            message: format!("unreadable {} response (status {status}): {message}", resource.as_str()),
        },
        RemoteError::Credential(inner) => inner,
    }
}

/// Name of the first offending field in a Box validation error, read from
/// `context_info.errors[0].name`.
fn offending_field(raw_body: &str) -> Option<String> {
    let body: Value = serde_json::from_str(raw_body).ok()?;
    body.pointer("/context_info/errors/0/name")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: u16, code: &str) -> RemoteError {
        RemoteError::from_response(
            status,
            format!(r#"{{"type":"error","status":{status},"code":"{code}","message":"boom"}}"#),
        )
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [412, 429, 500, 502, 503] {
            assert_eq!(
                classify(status, None, ResourceKind::User, RemoteOperation::Read),
                FailureKind::Retryable,
                "status {status}"
            );
        }
    }

    #[test]
    fn test_conflict_depends_on_operation_and_code() {
        assert_eq!(
            classify(
                409,
                Some("user_login_already_used"),
                ResourceKind::User,
                RemoteOperation::Create
            ),
            FailureKind::AlreadyExists
        );
        assert_eq!(
            classify(409, Some("conflict"), ResourceKind::Membership, RemoteOperation::Create),
            FailureKind::AlreadyExists
        );
        assert_eq!(
            classify(
                409,
                Some("operation_blocked_temporary"),
                ResourceKind::Group,
                RemoteOperation::Create
            ),
            FailureKind::Retryable
        );
        assert_eq!(
            classify(409, Some("conflict"), ResourceKind::User, RemoteOperation::Delete),
            FailureKind::Unclassified
        );
    }

    #[test]
    fn test_other_statuses() {
        let classify_read = |status| classify(status, None, ResourceKind::User, RemoteOperation::Read);

        assert_eq!(classify_read(404), FailureKind::NotFound);
        assert_eq!(classify_read(401), FailureKind::SecurityError);
        assert_eq!(classify_read(410), FailureKind::SecurityError);
        assert_eq!(classify_read(403), FailureKind::PermissionDenied);
        for status in [400, 405, 411, 413, 415] {
            assert_eq!(classify_read(status), FailureKind::InvalidAttribute);
        }
        assert_eq!(classify_read(418), FailureKind::Unclassified);
        assert_eq!(classify_read(501), FailureKind::Unclassified);
    }

    #[test]
    fn test_to_connector_error_conflict_on_create() {
        let err = to_connector_error(
            status_error(409, "user_login_already_used"),
            ResourceKind::User,
            RemoteOperation::Create,
            "ceo@example.com",
        );
        assert!(matches!(
            err,
            ConnectorError::AlreadyExists { ref identifier } if identifier == "ceo@example.com"
        ));
    }

    #[test]
    fn test_to_connector_error_not_found() {
        let err = to_connector_error(
            status_error(404, "not_found"),
            ResourceKind::User,
            RemoteOperation::Read,
            "11446498",
        );
        assert!(matches!(err, ConnectorError::UnknownUid { ref uid } if uid == "11446498"));
    }

    #[test]
    fn test_to_connector_error_keeps_unclassified_detail() {
        let err = to_connector_error(
            status_error(418, "teapot"),
            ResourceKind::Group,
            RemoteOperation::Update,
            "42",
        );
        match err {
            ConnectorError::Unclassified {
                status,
                code,
                message,
            } => {
                assert_eq!(status, Some(418));
                assert_eq!(code.as_deref(), Some("teapot"));
                assert_eq!(message, "boom");
            }
            other => panic!("Expected Unclassified, got {other:?}"),
        }
    }

    #[test]
    fn test_to_connector_error_retryable_is_transient() {
        let err = to_connector_error(
            status_error(429, "rate_limit_exceeded"),
            ResourceKind::User,
            RemoteOperation::List,
            "",
        );
        assert!(err.is_transient());
        assert_eq!(err.error_code(), "RETRYABLE");
    }

    #[test]
    fn test_invalid_attribute_names_offending_field() {
        let body = r#"{"type":"error","status":400,"code":"bad_request","message":"Bad Request","context_info":{"errors":[{"reason":"invalid_parameter","name":"login","message":"Invalid value"}]}}"#;
        let err = to_connector_error(
            RemoteError::from_response(400, body),
            ResourceKind::User,
            RemoteOperation::Create,
            "x",
        );
        assert!(matches!(
            err,
            ConnectorError::InvalidAttribute { ref attribute, .. } if attribute == "login"
        ));
    }

    #[test]
    fn test_transport_and_credential_errors() {
        let err = to_connector_error(
            RemoteError::Transport {
                message: "connection reset".to_string(),
                source: None,
            },
            ResourceKind::User,
            RemoteOperation::Read,
            "1",
        );
        assert!(matches!(err, ConnectorError::ConnectionFailed { .. }));

        let err = to_connector_error(
            RemoteError::Credential(ConnectorError::Security {
                message: "bad secret".to_string(),
            }),
            ResourceKind::User,
            RemoteOperation::Read,
            "1",
        );
        assert!(matches!(err, ConnectorError::Security { .. }));

        let transport = RemoteError::Transport {
            message: String::new(),
            source: None,
        };
        assert_eq!(
            kind_of(&transport, ResourceKind::User, RemoteOperation::Read),
            None
        );
    }
}
