//! Transport adapter — executes exactly one HTTP exchange.
//!
//! The client hands a resolved [`WireRequest`] to a [`Transport`] and gets a
//! [`Reply`] back. Connection, TLS and read failures are converted into
//! [`ApiError`] here; interpreting the status code is left to the client.

use std::future::Future;
use std::pin::Pin;

use bytes::BytesMut;
use tracing::debug;

use crate::error::{ApiError, BuildError};
use crate::http::{Headers, Reply, WireRequest};

#[cfg(test)]
pub(crate) mod mock;

const USER_AGENT: &str = concat!("fetchkit/", env!("CARGO_PKG_VERSION"));

/// Future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<Reply, ApiError>> + Send + 'a>>;

/// One HTTP request/response exchange.
///
/// # Contract
///
/// - Implementations must be `Send + Sync`; the client shares one transport
///   across every spawned call.
/// - The returned future may be dropped at any `.await` point when the call
///   is aborted or times out; implementations must not rely on running to
///   completion.
/// - Non-2xx replies are returned as `Ok`; only failures to complete the
///   exchange are errors.
pub trait Transport: Send + Sync {
    fn send(&self, request: WireRequest) -> TransportFuture<'_>;
}

/// Attaches `Authorization: Bearer <token>` unless the request already carries
/// an `Authorization` header.
pub fn attach_credential(request: &mut WireRequest, token: Option<&str>) {
    if let Some(token) = token {
        if !request.headers.contains("authorization") {
            request.headers.set_bearer(token);
        }
    }
}

/// Transport over a shared [`reqwest::Client`] with rustls.
///
/// Connections are pooled per host, redirects are followed and `https` URLs
/// work out of the box. The per-call timeout is enforced by the client, so
/// the `reqwest` client is built without one.
///
/// # Examples
///
/// ```rust,no_run
/// use fetchkit::http::{Method, WireRequest};
/// use fetchkit::transport::{HttpTransport, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpTransport::new(8 * 1024 * 1024)?;
/// let url = url::Url::parse("https://api.example.com/categories")?;
/// let reply = transport.send(WireRequest::new(Method::Get, url)).await?;
/// println!("{} ({} bytes)", reply.status, reply.body.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    max_response_bytes: usize,
}

impl HttpTransport {
    /// Builds a transport that rejects bodies larger than `max_response_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Transport`] if the TLS backend cannot be set up.
    pub fn new(max_response_bytes: usize) -> Result<Self, BuildError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self::with_client(http, max_response_bytes))
    }

    /// Wraps a caller-configured client (proxies, extra root certificates).
    pub fn with_client(http: reqwest::Client, max_response_bytes: usize) -> Self {
        Self {
            http,
            max_response_bytes,
        }
    }

    async fn exchange(&self, request: WireRequest) -> Result<Reply, ApiError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| ApiError::Unknown(format!("invalid method {:?}: {e}", request.method.as_str())))?;

        debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self.http.request(method, request.url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if !request.headers.contains("accept") {
            builder = builder.header(reqwest::header::ACCEPT, "application/json");
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let mut response = builder.send().await.map_err(failed)?;
        let status = response.status().as_u16();
        if response
            .content_length()
            .is_some_and(|len| len > self.max_response_bytes as u64)
        {
            return Err(self.too_large());
        }

        let mut headers = Headers::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str(), value);
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(failed)? {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(self.too_large());
            }
            body.extend_from_slice(&chunk);
        }

        debug!(status, bytes = body.len(), "response received");
        Ok(Reply {
            status,
            headers,
            body: body.freeze(),
        })
    }

    fn too_large(&self) -> ApiError {
        ApiError::Unknown(format!("response exceeds {} bytes", self.max_response_bytes))
    }
}

/// Request-building problems are the caller's fault; everything else means
/// the exchange did not complete.
fn failed(err: reqwest::Error) -> ApiError {
    if err.is_builder() {
        ApiError::Unknown(format!("invalid request: {err}"))
    } else {
        ApiError::Network(err.to_string())
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: WireRequest) -> TransportFuture<'_> {
        Box::pin(self.exchange(request))
    }
}
