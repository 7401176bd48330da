//! Request and reply types on the client side of the wire.
//!
//! [`RequestConfig`] describes what a caller wants, [`WireRequest`] is what a
//! transport sends, and [`Reply`] is what it reads back.

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::{Params, RequestConfig, WireRequest};
pub use reqwest::StatusCode;
pub use response::Reply;

/// Reason phrase for a raw status code, or `"Unknown"`.
///
/// # Examples
///
/// ```
/// use fetchkit::http::reason_phrase;
///
/// assert_eq!(reason_phrase(502), "Bad Gateway");
/// assert_eq!(reason_phrase(599), "Unknown");
/// ```
pub fn reason_phrase(code: u16) -> &'static str {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown")
}

/// Request method.
///
/// # Examples
///
/// ```
/// use fetchkit::http::Method;
///
/// let method: Method = "delete".parse().unwrap();
/// assert_eq!(method, Method::Delete);
/// assert_eq!(method.to_string(), "DELETE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    /// Any other token, sent verbatim.
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Custom(token) => token.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = match s.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Custom(s.to_owned()),
        };
        Ok(method)
    }
}
