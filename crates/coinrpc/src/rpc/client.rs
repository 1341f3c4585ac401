use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::{RpcConfig, DEFAULT_TIMEOUT};
use crate::error::{CoreError, TransportError};

use super::http_adapter::HttpTransport;
use super::protocol::{self, Call, Params, ResponseEnvelope};
use super::{SessionState, Transport};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// ==============================================================================
// RpcClient: generic JSON-RPC invocation over a Transport
// ==============================================================================

/// Caller-facing JSON-RPC client for one daemon endpoint.
///
/// Cloning is cheap and every clone shares the same session, id counter and
/// rate limiter. The session is released by [`close`](Self::close), by
/// [`scope`](Self::scope), or when the last clone is dropped.
pub struct RpcClient<T: Transport = HttpTransport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    transport: T,
    timeout: Duration,
    limiter: Option<DirectRateLimiter>,
    next_id: AtomicU64,
}

impl<T: Transport> Clone for RpcClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl RpcClient<HttpTransport> {
    /// Create a client over HTTP. The connection pool is opened on first use.
    pub fn new(config: RpcConfig) -> Self {
        let limiter = config
            .requests_per_second()
            .map(|limit| RateLimiter::direct(Quota::per_second(limit)));
        Self::from_parts(HttpTransport::new(&config), config.timeout(), limiter)
    }

    /// Create a client and open its session immediately.
    pub async fn connect(config: RpcConfig) -> Result<Self, CoreError> {
        let client = Self::new(config);
        client.open().await?;
        Ok(client)
    }
}

impl<T: Transport> RpcClient<T> {
    /// Wrap a custom transport. `timeout` is the default per-call deadline.
    pub fn with_transport(transport: T, timeout: Duration) -> Self {
        Self::from_parts(transport, timeout, None)
    }

    fn from_parts(transport: T, timeout: Duration, limiter: Option<DirectRateLimiter>) -> Self {
        let timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
        Self {
            inner: Arc::new(Inner {
                transport,
                timeout,
                limiter,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn state(&self) -> SessionState {
        self.inner.transport.state()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub async fn open(&self) -> Result<(), CoreError> {
        self.inner.transport.open().await
    }

    /// Release the session. Later calls on any clone fail with `Closed`.
    pub fn close(&self) {
        self.inner.transport.close();
    }

    /// Run `f` with this client and close the session afterwards.
    ///
    /// The session is closed on every exit: success, error, a panic inside
    /// `f`, or the returned future being dropped before it completes.
    pub async fn scope<F, Fut, R>(self, f: F) -> Result<R, CoreError>
    where
        F: FnOnce(RpcClient<T>) -> Fut,
        Fut: Future<Output = Result<R, CoreError>>,
    {
        let guard = CloseOnDrop(self);
        f(guard.0.clone()).await
    }

    /// Call `method` with the default timeout and return its raw result.
    pub async fn invoke(
        &self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<Value, CoreError> {
        self.invoke_with_timeout(method, params, self.inner.timeout)
            .await
    }

    pub async fn invoke_with_timeout(
        &self,
        method: &str,
        params: impl Into<Params>,
        timeout: Duration,
    ) -> Result<Value, CoreError> {
        let params = params.into();
        self.ensure_not_closed()?;

        let id = self.reserve_request_ids(1);
        let body = protocol::encode(method, &params, id)?;
        debug!(
            rpc.id = id,
            rpc.method = method,
            rpc.params = params.len(),
            "rpc call"
        );

        self.wait_for_rate_limit().await;
        let envelope = match self.exchange(method, body, timeout).await {
            Ok(bytes) => {
                trace!(rpc.id = id, rpc.method = method, body = %String::from_utf8_lossy(&bytes), "rpc response body");
                protocol::decode(&bytes)?
            }
            Err(CoreError::Transport(TransportError::Status { status, body })) => {
                match recover_error_envelope(&body, id) {
                    Some(envelope) => {
                        debug!(rpc.id = id, rpc.method = method, status, "rpc error carried by non-2xx response");
                        envelope
                    }
                    None => return Err(TransportError::Status { status, body }.into()),
                }
            }
            Err(err) => return Err(err),
        };

        if !envelope.matches(id) {
            return Err(CoreError::Protocol(format!(
                "response id {} does not match request id {id} for `{method}`",
                envelope.id
            )));
        }

        envelope.outcome.map_err(|err| {
            debug!(rpc.id = id, rpc.method = method, rpc.code = err.code, "rpc error");
            CoreError::Rpc(err)
        })
    }

    /// Send `calls` as one JSON-RPC batch.
    ///
    /// Returns one result per call, in the order of `calls`, whatever order
    /// the daemon answered in. The outer error covers failures of the whole
    /// exchange.
    pub async fn invoke_batch(
        &self,
        calls: &[Call],
    ) -> Result<Vec<Result<Value, CoreError>>, CoreError> {
        self.ensure_not_closed()?;
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let start_id = self.reserve_request_ids(calls.len() as u64);
        let body = protocol::encode_batch(calls, start_id)?;
        debug!(
            rpc.batch_start_id = start_id,
            rpc.batch_size = calls.len(),
            "rpc batch call"
        );

        self.wait_for_rate_limit().await;
        let bytes = self.exchange("batch", body, self.inner.timeout).await?;
        let decoded = protocol::decode_batch(&bytes)?;

        let mut by_id: HashMap<u64, ResponseEnvelope> = HashMap::with_capacity(decoded.len());
        for item in decoded {
            let id = match protocol::parse_id(&item.id) {
                Ok(id) => id,
                Err(err) => {
                    warn!(
                        rpc.batch_start_id = start_id,
                        %err,
                        "skipping batch item with unusable id"
                    );
                    continue;
                }
            };
            if by_id.insert(id, item).is_some() {
                return Err(CoreError::Protocol(format!(
                    "batch response repeats id {id}"
                )));
            }
        }

        let mut ordered = Vec::with_capacity(calls.len());
        for id in start_id..(start_id + calls.len() as u64) {
            let item = match by_id.remove(&id) {
                Some(item) => item.outcome.map_err(CoreError::Rpc),
                None => Err(CoreError::Protocol(format!(
                    "batch response is missing id {id}"
                ))),
            };
            ordered.push(item);
        }
        if !by_id.is_empty() {
            warn!(
                rpc.batch_start_id = start_id,
                unexpected = by_id.len(),
                "batch response carried ids that were never requested"
            );
        }

        Ok(ordered)
    }

    fn ensure_not_closed(&self) -> Result<(), CoreError> {
        if self.state() == SessionState::Closed {
            return Err(CoreError::Closed);
        }
        Ok(())
    }

    /// Atomically reserve `count` consecutive request ids.
    fn reserve_request_ids(&self, count: u64) -> u64 {
        self.inner.next_id.fetch_add(count, Ordering::Relaxed)
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.inner.limiter {
            limiter.until_ready().await;
        }
    }

    /// One transport exchange under `timeout`. On expiry the send future is
    /// dropped, which aborts the HTTP request and discards its connection.
    async fn exchange(
        &self,
        method: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, CoreError> {
        match tokio::time::timeout(timeout, self.inner.transport.send(body)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(rpc.method = method, ?timeout, "rpc call timed out");
                Err(CoreError::Timeout {
                    method: method.to_owned(),
                    after: timeout,
                })
            }
        }
    }
}

struct CloseOnDrop<T: Transport>(RpcClient<T>);

impl<T: Transport> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Older daemons report JSON-RPC errors with HTTP 404/500. Accept the body
/// only if it is an error envelope answering this request.
fn recover_error_envelope(body: &str, id: u64) -> Option<ResponseEnvelope> {
    let envelope = protocol::decode(body.as_bytes()).ok()?;
    (envelope.matches(id) && envelope.outcome.is_err()).then_some(envelope)
}
