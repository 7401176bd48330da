//! The request facade.
//!
//! [`ApiClient`] sits in front of a [`Transport`] and adds, per call:
//!
//! - an optional TTL cache lookup and write,
//! - single-flight deduplication of identical in-flight calls,
//! - a hard timeout and cooperative abort,
//! - bearer-credential attachment and a once-per-episode callback on 401.
//!
//! Cache and dedup state share one mutex. The cache check, the dedup check and
//! the registration of a new call happen in one critical section, so two
//! callers racing on one key never both dispatch. The transport call itself
//! runs in a spawned task that owns settling: it removes the dedup entry and
//! writes the cache exactly once, however many callers are waiting.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheStore, RequestKey};
use crate::config::ClientConfig;
use crate::dedup::DedupRegistry;
use crate::error::{ApiError, BuildError};
use crate::http::{Headers, Params, Reply, RequestConfig, WireRequest};
use crate::transport::{self, HttpTransport, Transport};

mod session;

pub use session::{CredentialFn, InvalidatedFn};

use session::Session;

/// Per-call behaviour switches.
///
/// The default is no caching, deduplication on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Serve from and store into the response cache.
    pub cache: bool,
    /// TTL for the stored entry; `None` uses the client's default.
    pub ttl: Option<Duration>,
    /// Share an identical in-flight call instead of issuing a new one.
    pub dedupe: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cache: false,
            ttl: None,
            dedupe: true,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default options with caching enabled.
    pub fn cached() -> Self {
        Self {
            cache: true,
            ..Self::default()
        }
    }

    /// Enables caching with an explicit TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache = true;
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn without_dedupe(mut self) -> Self {
        self.dedupe = false;
        self
    }
}

/// Snapshot returned by [`ApiClient::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Number of cache entries, stale ones included until they are read.
    pub size: usize,
    /// Cache keys in sorted order.
    pub keys: Vec<String>,
    /// Calls registered for deduplication and not yet settled.
    pub in_flight: usize,
}

type SharedCall = Shared<BoxFuture<'static, Result<Value, ApiError>>>;

/// Shared between the spawned call and everyone waiting on it.
#[derive(Debug)]
struct CallControl {
    abort: CancellationToken,
    waiters: AtomicUsize,
    /// Dedup registration ticket; 0 when the call was not registered.
    ticket: AtomicU64,
}

#[derive(Clone)]
struct InFlight {
    result: SharedCall,
    control: Arc<CallControl>,
}

struct State {
    cache: CacheStore<Value>,
    inflight: DedupRegistry<InFlight>,
}

struct Inner {
    config: ClientConfig,
    base_url: Url,
    default_headers: Headers,
    transport: Arc<dyn Transport>,
    session: Session,
    state: Mutex<State>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Lookup {
    Cached(Value),
    Waiting(InFlight),
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    credentials: Option<CredentialFn>,
    on_invalidated: Option<InvalidatedFn>,
}

impl ApiClientBuilder {
    /// Replaces the default [`HttpTransport`].
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Accessor for the bearer token attached to every request.
    ///
    /// It is called once per issued request, so token refreshes are picked up
    /// without rebuilding the client.
    #[must_use]
    pub fn credentials(mut self, accessor: impl Fn() -> Option<String> + Send + Sync + 'static) -> Self {
        self.credentials = Some(Arc::new(accessor));
        self
    }

    /// Callback fired when the server answers 401.
    ///
    /// Concurrent 401s from calls issued under the same credential fire it
    /// once.
    #[must_use]
    pub fn on_session_invalidated(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_invalidated = Some(Arc::new(callback));
        self
    }

    /// # Errors
    ///
    /// Returns [`BuildError::InvalidBaseUrl`] if `base_url` does not parse, or
    /// [`BuildError::Transport`] if the default transport cannot be built.
    pub fn build(self) -> Result<ApiClient, BuildError> {
        let base_url = Url::parse(&self.config.base_url).map_err(|source| BuildError::InvalidBaseUrl {
            url: self.config.base_url.clone(),
            source,
        })?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.max_response_bytes)?),
        };
        let state = State {
            cache: CacheStore::new(self.config.cache_ttl()),
            inflight: DedupRegistry::new(self.config.dedup_window()),
        };

        debug!(base_url = %base_url, timeout = ?self.config.timeout(), "api client ready");
        Ok(ApiClient {
            inner: Arc::new(Inner {
                default_headers: self.config.headers(),
                config: self.config,
                base_url,
                transport,
                session: Session::new(self.credentials, self.on_invalidated),
                state: Mutex::new(state),
            }),
        })
    }
}

/// Cached, deduplicating HTTP client for a JSON API.
///
/// Cloning is cheap; clones share cache, in-flight calls and session.
///
/// # Examples
///
/// ```rust,no_run
/// use fetchkit::{ApiClient, ClientConfig, RequestOptions};
/// use fetchkit::http::Params;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Category {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::builder(ClientConfig::new("http://localhost:5000/api"))
///     .credentials(|| std::env::var("API_TOKEN").ok())
///     .on_session_invalidated(|| eprintln!("signed out"))
///     .build()?;
///
/// let categories: Vec<Category> = client
///     .get("/categories", Params::new(), RequestOptions::cached())
///     .await?;
/// for c in &categories {
///     println!("{} {}", c.id, c.name);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("session", &self.inner.session)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            transport: None,
            credentials: None,
            on_invalidated: None,
        }
    }

    /// Client over the default transport, without credentials.
    ///
    /// # Errors
    ///
    /// See [`ApiClientBuilder::build`].
    pub fn new(config: ClientConfig) -> Result<Self, BuildError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: Params,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(RequestConfig::get(resource).params(params), options)
            .await
    }

    /// Sends `body` as JSON. A `()` body sends no body at all.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        resource: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let config = with_body(RequestConfig::post(resource), body)?;
        self.request(config, options).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        resource: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let config = with_body(RequestConfig::put(resource), body)?;
        self.request(config, options).await
    }

    pub async fn delete<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        resource: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let config = with_body(RequestConfig::delete(resource), body)?;
        self.request(config, options).await
    }

    /// Issues `config` and decodes the payload into `T`.
    ///
    /// # Errors
    ///
    /// Every failure is normalized into an [`ApiError`]; see its variants.
    pub async fn request<T: DeserializeOwned>(
        &self,
        config: RequestConfig,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let value = self.fetch_value(config, options, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Like [`request`](Self::request), but gives up with
    /// [`ApiError::Aborted`] as soon as `cancel` fires.
    ///
    /// Leaving does not necessarily stop the transport call: it is aborted
    /// only when no other caller is still waiting on it, and then nothing is
    /// cached.
    pub async fn request_with_cancel<T: DeserializeOwned>(
        &self,
        config: RequestConfig,
        options: RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<T, ApiError> {
        let value = self.fetch_value(config, options, Some(cancel)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Drops the cache entry for `key`. Returns `true` if one existed.
    pub fn invalidate(&self, key: impl AsRef<str>) -> bool {
        self.inner.state().cache.invalidate(key.as_ref())
    }

    /// Drops every cache entry whose key starts with `prefix`.
    ///
    /// See [`RequestKey::resource_prefix`] for building prefixes.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let removed = self.inner.state().cache.invalidate_prefix(prefix);
        debug!(prefix, removed, "invalidated cache prefix");
        removed
    }

    pub fn clear_cache(&self) {
        self.inner.state().cache.clear();
    }

    pub fn stats(&self) -> ClientStats {
        let state = self.inner.state();
        let cache = state.cache.stats();
        ClientStats {
            size: cache.size,
            keys: cache.keys,
            in_flight: state.inflight.len(),
        }
    }

    async fn fetch_value(
        &self,
        config: RequestConfig,
        options: RequestOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, ApiError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(ApiError::Aborted);
        }

        let key = RequestKey::derive(&config);
        let call = match self.lookup_or_issue(&key, &config, options)? {
            Lookup::Cached(value) => return Ok(value),
            Lookup::Waiting(call) => call,
        };

        let mut waiter = Waiter {
            inner: &self.inner,
            key: &key,
            control: &call.control,
            settled: false,
        };
        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(key = %key, "caller aborted");
                    return Err(ApiError::Aborted);
                }
                result = call.result.clone() => result,
            },
            None => call.result.clone().await,
        };
        waiter.settled = true;
        result
    }

    /// Serves a hit or joins a call when it can, otherwise issues one.
    ///
    /// The wire request is only built on a miss, outside the lock (the
    /// credential accessor is caller code). The second lookup and the
    /// registration then share one critical section, so a racing caller that
    /// registered in between is joined rather than duplicated.
    fn lookup_or_issue(
        &self,
        key: &RequestKey,
        config: &RequestConfig,
        options: RequestOptions,
    ) -> Result<Lookup, ApiError> {
        if let Some(found) = existing(&mut self.inner.state(), key, options) {
            return Ok(found);
        }

        let wire = self.wire_request(config)?;
        let epoch = self.inner.session.epoch();

        let mut state = self.inner.state();
        if let Some(found) = existing(&mut state, key, options) {
            return Ok(found);
        }

        let ttl = options
            .cache
            .then(|| options.ttl.unwrap_or_else(|| state.cache.default_ttl()));
        let call = self.spawn_call(key.clone(), wire, ttl, epoch);
        if options.dedupe {
            let ticket = state.inflight.register(key.as_str(), call.clone());
            call.control.ticket.store(ticket, Ordering::Release);
        }
        Ok(Lookup::Waiting(call))
    }

    fn wire_request(&self, config: &RequestConfig) -> Result<WireRequest, ApiError> {
        let url = config
            .resolve(&self.inner.base_url)
            .map_err(|e| ApiError::Unknown(format!("invalid request url {:?}: {e}", config.url)))?;

        let mut wire = WireRequest::new(config.method.clone(), url);
        wire.headers = config.headers.clone();
        wire.headers.merge_defaults(&self.inner.default_headers);
        if let Some(body) = &config.body {
            wire = wire.with_json(body.to_string());
        }
        transport::attach_credential(&mut wire, self.inner.session.credential().as_deref());
        Ok(wire)
    }

    fn spawn_call(&self, key: RequestKey, wire: WireRequest, ttl: Option<Duration>, epoch: u64) -> InFlight {
        let control = Arc::new(CallControl {
            abort: CancellationToken::new(),
            waiters: AtomicUsize::new(1),
            ticket: AtomicU64::new(0),
        });
        let task = tokio::spawn(run_call(
            Arc::clone(&self.inner),
            key,
            wire,
            ttl,
            epoch,
            Arc::clone(&control),
        ));
        let result = async move {
            task.await
                .unwrap_or_else(|e| Err(ApiError::Unknown(format!("request task failed: {e}"))))
        }
        .boxed()
        .shared();
        InFlight { result, control }
    }
}

/// Cache hit or joinable in-flight call for `key`, as `options` allow.
fn existing(state: &mut State, key: &RequestKey, options: RequestOptions) -> Option<Lookup> {
    if options.cache {
        if let Some(value) = state.cache.get(key.as_str()) {
            debug!(key = %key, "cache hit");
            return Some(Lookup::Cached(value));
        }
    }
    if options.dedupe {
        if let Some(call) = state.inflight.lookup(key.as_str()) {
            call.control.waiters.fetch_add(1, Ordering::AcqRel);
            debug!(key = %key, "joined in-flight call");
            return Some(Lookup::Waiting(call));
        }
    }
    None
}

fn with_body<B: Serialize + ?Sized>(config: RequestConfig, body: &B) -> Result<RequestConfig, ApiError> {
    config
        .json(body)
        .map_err(|e| ApiError::Unknown(format!("failed to encode request body: {e}")))
}

/// Leaves a shared call. The last waiter to leave aborts it.
struct Waiter<'a> {
    inner: &'a Inner,
    key: &'a RequestKey,
    control: &'a CallControl,
    settled: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.inner.state();
        if self.control.waiters.fetch_sub(1, Ordering::AcqRel) == 1 {
            let ticket = self.control.ticket.load(Ordering::Acquire);
            state.inflight.complete(self.key.as_str(), ticket);
            self.control.abort.cancel();
            debug!(key = %self.key, "no waiters left; aborting call");
        }
    }
}

/// Runs one transport exchange and settles it.
///
/// `ttl` is `Some` when a successful payload should be cached.
async fn run_call(
    inner: Arc<Inner>,
    key: RequestKey,
    wire: WireRequest,
    ttl: Option<Duration>,
    epoch: u64,
    control: Arc<CallControl>,
) -> Result<Value, ApiError> {
    let timeout = inner.config.timeout();
    debug!(key = %key, method = %wire.method, url = %wire.url, "issuing request");

    let outcome = tokio::select! {
        biased;
        _ = control.abort.cancelled() => Err(ApiError::Aborted),
        sent = tokio::time::timeout(timeout, inner.transport.send(wire)) => match sent {
            Ok(reply) => reply.and_then(interpret),
            Err(_) => Err(ApiError::Timeout(timeout)),
        },
    };

    {
        let mut state = inner.state();
        state
            .inflight
            .complete(key.as_str(), control.ticket.load(Ordering::Acquire));
        if let (Ok(value), Some(ttl)) = (&outcome, ttl) {
            if !control.abort.is_cancelled() {
                state.cache.set(key.as_str(), value.clone(), ttl);
            }
        }
    }

    match &outcome {
        Ok(_) => debug!(key = %key, "request settled"),
        Err(ApiError::Aborted) => debug!(key = %key, "request aborted"),
        Err(err) => {
            if err.is_unauthorized() {
                inner.session.invalidate(epoch);
            }
            warn!(key = %key, error = %err, "request failed");
        }
    }
    outcome
}

/// Turns a reply into a payload: 2xx bodies as JSON (empty → `null`, non-JSON
/// text → string), anything else as [`ApiError::Http`].
fn interpret(reply: Reply) -> Result<Value, ApiError> {
    if !reply.is_success() {
        return Err(ApiError::from_status(reply.status, &reply.body));
    }
    if reply.body.is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_slice(&reply.body) {
        Ok(value) => Ok(value),
        Err(err) => match std::str::from_utf8(&reply.body) {
            Ok(text) => Ok(Value::String(text.to_owned())),
            Err(_) => Err(ApiError::Decode(err.to_string())),
        },
    }
}
