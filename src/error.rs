//! Normalized error taxonomy returned by every client operation.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::http::{self, StatusCode};

/// Errors surfaced by [`ApiClient`](crate::ApiClient) operations.
///
/// Every transport failure is converted into one of these variants before it
/// leaves the client. The type is `Clone` so a single deduplicated call can
/// hand the same error to each waiting caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// The request never reached the server (connect, write or read failed).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The call exceeded the per-call hard timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the request.
    #[error("request aborted")]
    Aborted,

    /// The payload did not match the type the caller asked for.
    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    /// Builds an [`ApiError::Http`] from a failed reply.
    ///
    /// The message is the JSON body's `message` field when the server sent
    /// one, otherwise `HTTP <status>: <reason>`.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or_else(|| format!("HTTP {status}: {}", http::reason_phrase(status)));
        ApiError::Http { status, message }
    }

    /// Returns `true` if this is a caller-initiated cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ApiError::Aborted)
    }

    /// Returns `true` for an HTTP 401 reply.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED.as_u16())
    }

    /// HTTP status code, for [`ApiError::Http`] only.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Errors raised while constructing a client.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid base url {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to set up the HTTP transport: {0}")]
    Transport(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_message_prefers_server_message() {
        let err = ApiError::from_status(404, br#"{"message":"Model not found"}"#);
        assert_eq!(
            err,
            ApiError::Http {
                status: 404,
                message: "Model not found".into()
            }
        );
        assert_eq!(err.to_string(), "Model not found");
    }

    #[test]
    fn http_message_falls_back_to_reason() {
        let err = ApiError::from_status(502, b"<html>bad gateway</html>");
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");

        let err = ApiError::from_status(599, b"");
        assert_eq!(err.to_string(), "HTTP 599: Unknown");
    }

    #[test]
    fn classification_helpers() {
        assert!(ApiError::from_status(401, b"").is_unauthorized());
        assert!(!ApiError::from_status(403, b"").is_unauthorized());
        assert!(ApiError::Aborted.is_aborted());
        assert_eq!(ApiError::Timeout(Duration::from_secs(30)).status(), None);
    }
}
