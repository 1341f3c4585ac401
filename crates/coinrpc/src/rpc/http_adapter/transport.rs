use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap};
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::config::{Credentials, RpcConfig};
use crate::error::{CoreError, TransportError};

use super::super::{SessionState, Transport};

enum Session {
    Unopened,
    Open(reqwest::Client),
    Closed,
}

/// JSON-RPC transport over HTTP(S) with a pooled `reqwest::Client`.
///
/// The pool is built on first use (or by [`Transport::open`]) and dropped by
/// [`Transport::close`]. At most `pool_size` exchanges run at once; further
/// sends wait for a permit. Exchanges already in flight when the transport is
/// closed keep their own handle to the pool and finish normally, while sends
/// still waiting for a permit fail with [`CoreError::Closed`].
pub struct HttpTransport {
    url: String,
    credentials: Credentials,
    headers: HeaderMap,
    connect_timeout: Duration,
    pool_size: usize,
    permits: Semaphore,
    session: Mutex<Session>,
}

impl HttpTransport {
    pub fn new(config: &RpcConfig) -> Self {
        Self {
            url: config.url().to_owned(),
            credentials: config.credentials().clone(),
            headers: config.headers().clone(),
            connect_timeout: config.connect_timeout(),
            pool_size: config.pool_size(),
            permits: Semaphore::new(config.pool_size()),
            session: Mutex::new(Session::Unopened),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the pooled client, opening the session if needed.
    fn client(&self) -> Result<reqwest::Client, CoreError> {
        let mut session = self.session();
        match &*session {
            Session::Open(client) => return Ok(client.clone()),
            Session::Closed => return Err(CoreError::Closed),
            Session::Unopened => {}
        }

        let client = self.build_client()?;
        *session = Session::Open(client.clone());
        debug!(url = %self.url, pool_size = self.pool_size, "rpc session opened");
        Ok(client)
    }

    fn build_client(&self) -> Result<reqwest::Client, CoreError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.pool_size)
            .tcp_nodelay(true)
            .default_headers(self.headers.clone())
            .build()
            .map_err(|e| TransportError::Request(e).into())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self) -> Result<(), CoreError> {
        self.client().map(|_| ())
    }

    async fn send(&self, body: Vec<u8>) -> Result<Vec<u8>, CoreError> {
        let client = self.client()?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CoreError::Closed)?;
        trace!(url = %self.url, body_len = body.len(), "rpc request");

        let response = client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .basic_auth(&self.credentials.user, Some(&self.credentials.pass))
            .body(body)
            .send()
            .await
            .map_err(TransportError::Request)?;
        let status = response.status();

        let bytes = response.bytes().await.map_err(TransportError::Request)?;
        debug!(%status, body_len = bytes.len(), "rpc http response");

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }
            .into());
        }

        Ok(bytes.to_vec())
    }

    fn close(&self) {
        let mut session = self.session();
        if !matches!(*session, Session::Closed) {
            *session = Session::Closed;
            self.permits.close();
            debug!(url = %self.url, "rpc session closed");
        }
    }

    fn state(&self) -> SessionState {
        match *self.session() {
            Session::Unopened => SessionState::Unopened,
            Session::Open(_) => SessionState::Open,
            Session::Closed => SessionState::Closed,
        }
    }
}
