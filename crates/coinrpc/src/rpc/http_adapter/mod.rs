//! HTTP transport for Bitcoin Core compatible endpoints.
//!
//! Implements [`Transport`](super::Transport) with `reqwest`: one pooled
//! client per session, HTTP Basic auth and JSON content type on every POST.

mod transport;

pub use transport::HttpTransport;
