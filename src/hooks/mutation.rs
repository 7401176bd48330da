use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use super::ErrorFn;
use crate::client::ApiClient;
use crate::error::ApiError;

/// Outcome of the latest [`Mutation::mutate`].
#[derive(Debug, Clone, PartialEq)]
pub struct MutationState<R> {
    pub data: Option<R>,
    pub loading: bool,
    pub error: Option<ApiError>,
}

impl<R> Default for MutationState<R> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

type RunFn<I, R> = Arc<dyn Fn(ApiClient, I) -> BoxFuture<'static, Result<R, ApiError>> + Send + Sync>;

/// A write operation with optional optimistic update and rollback.
///
/// On success the listed cache prefixes are invalidated before `on_success`
/// runs, so a refetch from the callback sees fresh data. On failure `rollback`
/// runs before `on_error`. `on_settled` always runs last.
///
/// An aborted mutation still rolls back, since its write was never
/// confirmed, but it is not a failure: the error is not stored and
/// `on_error` does not fire.
///
/// # Examples
///
/// ```rust,no_run
/// use fetchkit::{ApiClient, ClientConfig, RequestKey, RequestOptions};
/// use fetchkit::hooks::Mutation;
/// use fetchkit::http::Method;
/// use serde_json::{Value, json};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::new(ClientConfig::from_env())?;
/// let like = Mutation::new(client, |client: ApiClient, model_id: String| async move {
///     client
///         .post::<Value, _>("/models/like", &json!({ "modelId": model_id }), RequestOptions::default())
///         .await
/// })
/// .invalidates(RequestKey::resource_prefix(&Method::Get, "/models"));
///
/// like.mutate("m-42".to_owned()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Mutation<I, R> {
    client: ApiClient,
    run: RunFn<I, R>,
    optimistic: Option<Arc<dyn Fn(&I) + Send + Sync>>,
    rollback: Option<Arc<dyn Fn() + Send + Sync>>,
    on_success: Option<Arc<dyn Fn(&R) + Send + Sync>>,
    on_error: Option<ErrorFn>,
    on_settled: Option<Arc<dyn Fn() + Send + Sync>>,
    invalidates: Vec<String>,
    state: Mutex<MutationState<R>>,
}

impl<I, R> Mutation<I, R>
where
    I: Send + 'static,
    R: Clone + Send + 'static,
{
    pub fn new<F, Fut>(client: ApiClient, run: F) -> Self
    where
        F: Fn(ApiClient, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    {
        Self {
            client,
            run: Arc::new(move |client: ApiClient, input: I| run(client, input).boxed()),
            optimistic: None,
            rollback: None,
            on_success: None,
            on_error: None,
            on_settled: None,
            invalidates: Vec::new(),
            state: Mutex::new(MutationState::default()),
        }
    }

    /// Applied to the input before the mutation is sent.
    #[must_use]
    pub fn optimistic(mut self, update: impl Fn(&I) + Send + Sync + 'static) -> Self {
        self.optimistic = Some(Arc::new(update));
        self
    }

    /// Undoes the optimistic update when the mutation fails.
    #[must_use]
    pub fn rollback(mut self, undo: impl Fn() + Send + Sync + 'static) -> Self {
        self.rollback = Some(Arc::new(undo));
        self
    }

    #[must_use]
    pub fn on_success(mut self, callback: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&ApiError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_settled(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_settled = Some(Arc::new(callback));
        self
    }

    /// Cache key prefix to drop after a successful mutation. May be repeated.
    #[must_use]
    pub fn invalidates(mut self, prefix: impl Into<String>) -> Self {
        self.invalidates.push(prefix.into());
        self
    }

    fn state_lock(&self) -> MutexGuard<'_, MutationState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> MutationState<R> {
        self.state_lock().clone()
    }

    /// Runs the mutation.
    ///
    /// # Errors
    ///
    /// Returns the mutation's error after rolling back and firing `on_error`
    /// (skipped for [`ApiError::Aborted`]).
    pub async fn mutate(&self, input: I) -> Result<R, ApiError> {
        {
            let mut state = self.state_lock();
            state.loading = true;
            state.error = None;
        }
        if let Some(update) = &self.optimistic {
            update(&input);
        }

        let outcome = (self.run)(self.client.clone(), input).await;

        match &outcome {
            Ok(data) => {
                for prefix in &self.invalidates {
                    self.client.invalidate_prefix(prefix);
                }
                {
                    let mut state = self.state_lock();
                    state.data = Some(data.clone());
                    state.loading = false;
                }
                if let Some(callback) = &self.on_success {
                    callback(data);
                }
            }
            Err(err) if err.is_aborted() => {
                debug!("mutation aborted; rolling back");
                self.state_lock().loading = false;
                if let Some(undo) = &self.rollback {
                    undo();
                }
            }
            Err(err) => {
                debug!(error = %err, "mutation failed; rolling back");
                {
                    let mut state = self.state_lock();
                    state.error = Some(err.clone());
                    state.loading = false;
                }
                if let Some(undo) = &self.rollback {
                    undo();
                }
                if let Some(callback) = &self.on_error {
                    callback(err);
                }
            }
        }
        if let Some(callback) = &self.on_settled {
            callback();
        }
        outcome
    }
}
