use std::time::Duration;

/// Top-level error for every client operation.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("rpc `{method}` timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("failed to encode JSON-RPC request: {0}")]
    Encoding(String),

    #[error("failed to decode JSON-RPC response: {0}")]
    Decoding(String),

    #[error("JSON-RPC protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("rpc client is closed")]
    Closed,

    #[error("unexpected result for `{method}`: {message}")]
    InvalidResult { method: String, message: String },
}

impl CoreError {
    /// The daemon's JSON-RPC error code, if this is an application error.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            CoreError::Rpc(err) => Some(err.code),
            _ => None,
        }
    }

    /// The HTTP status, if the daemon answered with a non-2xx response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            CoreError::Transport(TransportError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Connection-level failure between the client and the daemon.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, DNS, TLS, or a broken exchange.
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The daemon answered with a non-2xx HTTP status.
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Error object returned by the daemon inside a JSON-RPC response.
///
/// `code` and `message` are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_method_not_found(&self) -> bool {
        self.code == Self::METHOD_NOT_FOUND
    }
}
