//! JSON-RPC engine.
//!
//! Defines the [`Transport`] seam, the reqwest-backed [`HttpTransport`], the
//! envelope codec in [`protocol`], and the [`RpcClient`] façade that ties
//! them together. A scripted test double lives in `mock`.

mod client;
mod http_adapter;
#[cfg(test)]
pub mod mock;
pub mod protocol;

pub use client::RpcClient;
pub use http_adapter::HttpTransport;
pub use protocol::{Call, Params, ResponseEnvelope};

use async_trait::async_trait;

use crate::error::CoreError;

/// Lifecycle of a transport session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Open,
    Closed,
}

/// A channel to one daemon endpoint.
///
/// Every `send` is a self-contained request/response exchange, so
/// implementations must tolerate many concurrent calls without sequencing.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Acquire connection resources. Idempotent while open.
    async fn open(&self) -> Result<(), CoreError>;

    /// Perform one exchange and return the raw response body.
    ///
    /// Opens the session on first use. Fails with [`CoreError::Closed`]
    /// after [`close`](Transport::close).
    async fn send(&self, body: Vec<u8>) -> Result<Vec<u8>, CoreError>;

    /// Release connection resources. Safe to call more than once.
    ///
    /// Synchronous so it can run from `Drop`.
    fn close(&self);

    fn state(&self) -> SessionState;
}
