//! What a transport hands back for one exchange.

use bytes::Bytes;

use super::Headers;

/// A complete server response: status, headers and the fully read body.
///
/// # Examples
///
/// ```
/// use fetchkit::http::Reply;
///
/// let reply = Reply::new(201, r#"{"liked":true}"#);
/// assert!(reply.is_success());
/// assert!(reply.headers.is_empty());
/// assert!(!Reply::new(401, "").is_success());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
