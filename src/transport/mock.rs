//! Scripted in-memory transport for client and hook tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use super::{Transport, TransportFuture};
use crate::error::ApiError;
use crate::http::{Reply, WireRequest};

/// What the mock does with one request.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Reply immediately.
    Reply(u16, Value),
    /// Reply after the given delay.
    Delayed(Duration, u16, Value),
    /// Never reply; only abort or timeout ends the call.
    Hang,
    /// Fail at the transport level.
    Fail(ApiError),
}

type Responder = dyn Fn(&WireRequest) -> Script + Send + Sync;

pub(crate) struct MockTransport {
    responder: Box<Responder>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    dropped: AtomicUsize,
    requests: Mutex<Vec<WireRequest>>,
}

impl MockTransport {
    pub(crate) fn new(responder: impl Fn(&WireRequest) -> Script + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request gets the same script.
    pub(crate) fn always(script: Script) -> Arc<Self> {
        Self::new(move |_| script.clone())
    }

    /// Number of exchanges started.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Exchanges that produced a reply or a transport error.
    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Exchanges whose future was dropped before finishing (aborted or timed out).
    pub(crate) fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Counts the exchange as dropped unless it was marked finished.
struct ExchangeGuard<'a> {
    transport: &'a MockTransport,
    finished: bool,
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        let counter = if self.finished {
            &self.transport.completed
        } else {
            &self.transport.dropped
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// JSON reply; a `null` body is sent as an empty one.
pub(crate) fn reply(status: u16, body: &Value) -> Reply {
    let mut reply = Reply::new(status, if body.is_null() { String::new() } else { body.to_string() });
    reply.headers.insert("Content-Type", "application/json");
    reply
}

impl Transport for MockTransport {
    fn send(&self, request: WireRequest) -> TransportFuture<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);

        Box::pin(async move {
            let mut guard = ExchangeGuard {
                transport: self,
                finished: false,
            };
            let outcome = match script {
                Script::Reply(status, body) => Ok(reply(status, &body)),
                Script::Delayed(delay, status, body) => {
                    tokio::time::sleep(delay).await;
                    Ok(reply(status, &body))
                }
                Script::Hang => std::future::pending().await,
                Script::Fail(err) => Err(err),
            };
            guard.finished = true;
            outcome
        })
    }
}
