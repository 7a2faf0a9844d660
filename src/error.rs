// Error handling module
// Defines the error taxonomy shared by every client operation

use thiserror::Error;

/// Errors returned by the CMQ client
#[derive(Error, Debug)]
pub enum CmqError {
    /// A request argument is outside its documented range.
    /// Raised before any network traffic.
    #[error("invalid parameter {field}({range}): {value}")]
    InvalidParameter {
        field: &'static str,
        range: String,
        value: String,
    },

    /// Endpoint URI could not be parsed
    #[error("invalid endpoint uri {uri}: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// HTTP method other than GET or POST
    #[error("unsupported request method: {0}")]
    UnsupportedMethod(String),

    /// Signature method other than HmacSHA1 or HmacSHA256
    #[error("unsupported signature method: {0}")]
    UnsupportedSignMethod(String),

    /// The underlying reqwest client could not be built
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Connection, TLS, timeout or body read failure
    #[error("http transport error ({kind}): {source}")]
    Transport {
        kind: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Response body is not the expected JSON
    #[error("json decode: {source}, response: {raw}")]
    Decode {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    /// Service answered with a non-zero business code
    #[error("business error {code}: {message} (requestId: {request_id})")]
    Business {
        code: i64,
        message: String,
        request_id: String,
    },
}

impl CmqError {
    /// Build a parameter error naming the field, its valid range and the offending value
    pub fn invalid(field: &'static str, range: impl Into<String>, value: impl ToString) -> Self {
        CmqError::InvalidParameter {
            field,
            range: range.into(),
            value: value.to_string(),
        }
    }

    /// Whether the error was raised by local validation
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, CmqError::InvalidParameter { .. })
    }

    /// Whether the error happened on the wire
    pub fn is_transport(&self) -> bool {
        matches!(self, CmqError::Transport { .. })
    }

    /// Classify a reqwest error the way the request logs report it
    pub(crate) fn transport(source: reqwest::Error) -> Self {
        let kind = if source.is_timeout() {
            "timeout"
        } else if source.is_connect() {
            "connection_failed"
        } else if source.is_request() {
            "request_error"
        } else if source.is_body() {
            "body_error"
        } else if source.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };
        CmqError::Transport { kind, source }
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, CmqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter_message() {
        let err = CmqError::invalid("queue name", "0<len<65", "bad name!");
        assert_eq!(
            err.to_string(),
            "invalid parameter queue name(0<len<65): bad name!"
        );
        assert!(err.is_invalid_parameter());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_unsupported_method_message() {
        let err = CmqError::UnsupportedMethod("PUT".to_string());
        assert_eq!(err.to_string(), "unsupported request method: PUT");
    }

    #[test]
    fn test_business_error_message() {
        let err = CmqError::Business {
            code: 4440,
            message: "queue not exist".to_string(),
            request_id: "req-1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "business error 4440: queue not exist (requestId: req-1)"
        );
    }

    #[test]
    fn test_decode_error_keeps_raw_body() {
        let source = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        let err = CmqError::Decode {
            raw: "<html>".to_string(),
            source,
        };
        assert!(err.to_string().ends_with("response: <html>"));
    }

    #[test]
    fn test_invalid_uri_message() {
        let source = url::Url::parse("not a uri").unwrap_err();
        let err = CmqError::InvalidUri {
            uri: "not a uri".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("invalid endpoint uri not a uri"));
    }
}
