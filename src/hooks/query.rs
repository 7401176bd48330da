use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use tracing::debug;

use super::ErrorFn;
use crate::cancel::{CancelController, Lease};
use crate::client::{ApiClient, RequestOptions};
use crate::error::ApiError;
use crate::http::{Params, RequestConfig};

/// What a [`Query`] currently knows.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<ApiError>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

type SuccessFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A GET subscription that can be refetched and disposed.
///
/// Only the most recent fetch may write state: starting a fetch aborts the one
/// before it, and a fetch whose lease was cancelled (superseded or disposed)
/// settles without touching state or firing callbacks. Aborts are never
/// reported to `on_error`.
///
/// Callbacks run while the fetch publishes its result, so they must not call
/// [`dispose`](Self::dispose) on the same query. Dropping the query disposes
/// it.
///
/// # Examples
///
/// ```rust,no_run
/// use fetchkit::{ApiClient, ClientConfig, RequestOptions};
/// use fetchkit::hooks::Query;
/// use fetchkit::http::Params;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::new(ClientConfig::from_env())?;
/// let trending = Query::<serde_json::Value>::new(client, "/models/trending", Params::new())
///     .options(RequestOptions::cached())
///     .on_error(|err| eprintln!("trending failed: {err}"));
///
/// trending.fetch().await;
/// println!("{:?}", trending.state().data);
/// # Ok(())
/// # }
/// ```
pub struct Query<T> {
    client: ApiClient,
    request: Mutex<RequestConfig>,
    options: RequestOptions,
    enabled: AtomicBool,
    controller: CancelController,
    state: Mutex<QueryState<T>>,
    /// Held while a fetch publishes its result; `dispose` takes it too.
    settle: Mutex<()>,
    on_success: Option<SuccessFn<T>>,
    on_error: Option<ErrorFn>,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> Query<T>
where
    T: DeserializeOwned + Clone + Send,
{
    pub fn new(client: ApiClient, resource: impl Into<String>, params: Params) -> Self {
        Self {
            client,
            request: Mutex::new(RequestConfig::get(resource).params(params)),
            options: RequestOptions::default(),
            enabled: AtomicBool::new(true),
            controller: CancelController::new(),
            state: Mutex::new(QueryState::default()),
            settle: Mutex::new(()),
            on_success: None,
            on_error: None,
        }
    }

    #[must_use]
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// A disabled query ignores [`fetch`](Self::fetch) until re-enabled.
    #[must_use]
    pub fn enabled(self, enabled: bool) -> Self {
        self.enabled.store(enabled, Ordering::Release);
        self
    }

    #[must_use]
    pub fn on_success(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&ApiError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Parameters used by the next fetch. The current fetch is not touched.
    pub fn set_params(&self, params: Params) {
        lock(&self.request).params = params;
    }

    pub fn state(&self) -> QueryState<T> {
        lock(&self.state).clone()
    }

    /// Fetches with the current parameters, aborting any earlier fetch.
    ///
    /// Returns `None` without issuing anything when the query is disabled or
    /// disposed. A fetch that was superseded or disposed while pending
    /// returns `Some(Err(ApiError::Aborted))`.
    pub async fn fetch(&self) -> Option<Result<T, ApiError>> {
        if !self.enabled.load(Ordering::Acquire) {
            return None;
        }
        let lease = self.controller.begin()?;
        if !self.mark_loading(&lease) {
            return Some(Err(ApiError::Aborted));
        }
        let request = lock(&self.request).clone();

        let outcome = self
            .client
            .request_with_cancel::<T>(request, self.options, lease.token())
            .await;

        let _settle = lock(&self.settle);
        if lease.is_cancelled() {
            debug!("query fetch superseded");
            return Some(Err(ApiError::Aborted));
        }
        {
            let mut state = lock(&self.state);
            state.loading = false;
            match &outcome {
                Ok(data) => state.data = Some(data.clone()),
                Err(err) if !err.is_aborted() => state.error = Some(err.clone()),
                Err(_) => {}
            }
        }
        match &outcome {
            Ok(data) => {
                if let Some(callback) = &self.on_success {
                    callback(data);
                }
            }
            Err(err) if !err.is_aborted() => {
                if let Some(callback) = &self.on_error {
                    callback(err);
                }
            }
            Err(_) => {}
        }
        self.controller.finish(&lease);
        Some(outcome)
    }

    /// Publishes the loading state unless `lease` was already cancelled.
    fn mark_loading(&self, lease: &Lease) -> bool {
        let _settle = lock(&self.settle);
        if lease.is_cancelled() {
            return false;
        }
        let mut state = lock(&self.state);
        state.loading = true;
        state.error = None;
        true
    }

    /// Same as [`fetch`](Self::fetch).
    pub async fn refetch(&self) -> Option<Result<T, ApiError>> {
        self.fetch().await
    }
}

impl<T> Query<T> {
    /// Aborts the outstanding fetch. No state write or callback starts after
    /// this returns, and later fetches are refused.
    pub fn dispose(&self) {
        let _settle = lock(&self.settle);
        self.controller.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.controller.is_disposed()
    }
}

impl<T> Drop for Query<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use serde_json::{Value, json};
    use tokio::time::sleep;

    use super::*;
    use crate::ClientConfig;
    use crate::transport::Transport;
    use crate::transport::mock::{MockTransport, Script};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn client(mock: &Arc<MockTransport>) -> ApiClient {
        ApiClient::builder(ClientConfig::new("http://api.local"))
            .transport(Arc::clone(mock) as Arc<dyn Transport>)
            .build()
            .unwrap()
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&count), count)
    }

    #[tokio::test]
    async fn fetch_stores_data_and_fires_on_success() {
        let mock = MockTransport::always(Script::Reply(200, json!([{"id": 1}])));
        let (seen, hits) = counter();
        let query = Query::<Value>::new(client(&mock), "/models", Params::new()).on_success(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        let result = query.fetch().await.unwrap().unwrap();
        assert_eq!(result, json!([{"id": 1}]));
        assert_eq!(
            query.state(),
            QueryState {
                data: Some(json!([{"id": 1}])),
                loading: false,
                error: None,
            }
        );
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_sets_error_and_fires_on_error() {
        let mock = MockTransport::always(Script::Reply(404, json!({"message": "Model not found"})));
        let (seen, hits) = counter();
        let query = Query::<Value>::new(client(&mock), "/models/404", Params::new()).on_error(move |err| {
            assert_eq!(err.status(), Some(404));
            hits.fetch_add(1, Ordering::SeqCst);
        });

        assert!(query.fetch().await.unwrap().is_err());
        let state = query.state();
        assert!(!state.loading);
        assert_eq!(state.data, None);
        assert_eq!(state.error.map(|e| e.to_string()).as_deref(), Some("Model not found"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_query_does_not_fetch() {
        let mock = MockTransport::always(Script::Reply(200, json!([])));
        let query = Query::<Value>::new(client(&mock), "/models", Params::new()).enabled(false);

        assert!(query.fetch().await.is_none());
        assert_eq!(mock.calls(), 0);

        query.set_enabled(true);
        assert!(query.refetch().await.is_some());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_while_pending_aborts_silently() {
        let mock = MockTransport::always(Script::Delayed(ms(500), 200, json!(["chairs"])));
        let client = client(&mock);
        let (successes, on_success) = counter();
        let (errors, on_error) = counter();
        let query = Arc::new(
            Query::<Value>::new(client.clone(), "/categories", Params::new())
                .options(RequestOptions::cached())
                .on_success(move |_| {
                    on_success.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |_| {
                    on_error.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let pending = {
            let query = Arc::clone(&query);
            tokio::spawn(async move { query.fetch().await })
        };
        sleep(ms(10)).await;
        query.dispose();

        let outcome = pending.await.unwrap();
        assert_eq!(outcome, Some(Err(ApiError::Aborted)));
        sleep(ms(1)).await;

        assert_eq!(mock.dropped(), 1);
        assert_eq!(client.stats().size, 0);
        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert_eq!(query.state().data, None);
        assert!(query.fetch().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_supersedes_pending_fetch() {
        let mock = MockTransport::new(|req| match req.url.query() {
            Some("page=1") => Script::Delayed(ms(100), 200, json!({"page": 1})),
            _ => Script::Delayed(ms(10), 200, json!({"page": 2})),
        });
        let (successes, on_success) = counter();
        let query = Arc::new(
            Query::<Value>::new(client(&mock), "/models", Params::new().with("page", 1)).on_success(move |_| {
                on_success.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let first = {
            let query = Arc::clone(&query);
            tokio::spawn(async move { query.fetch().await })
        };
        sleep(ms(5)).await;
        query.set_params(Params::new().with("page", 2));
        let second = query.refetch().await.unwrap().unwrap();

        assert_eq!(second, json!({"page": 2}));
        assert_eq!(first.await.unwrap(), Some(Err(ApiError::Aborted)));
        assert_eq!(query.state().data, Some(json!({"page": 2})));
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(mock.calls(), 2);
        assert_eq!(mock.dropped(), 1);
    }

    #[tokio::test]
    async fn dispose_between_begin_and_loading_writes_nothing() {
        let mock = MockTransport::always(Script::Reply(200, json!([])));
        let query = Query::<Value>::new(client(&mock), "/models", Params::new());

        let lease = query.controller.begin().unwrap();
        query.dispose();
        assert!(!query.mark_loading(&lease));
        assert_eq!(query.state(), QueryState::default());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_is_visible_while_pending() {
        let mock = MockTransport::always(Script::Delayed(ms(50), 200, json!(1)));
        let query = Arc::new(Query::<u32>::new(client(&mock), "/count", Params::new()));

        let pending = {
            let query = Arc::clone(&query);
            tokio::spawn(async move { query.fetch().await })
        };
        sleep(ms(10)).await;
        assert!(query.state().loading);

        assert_eq!(pending.await.unwrap(), Some(Ok(1)));
        assert!(!query.state().loading);
    }
}
