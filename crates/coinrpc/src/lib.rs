//! Async JSON-RPC client for Bitcoin Core compatible coin daemons.
//!
//! [`RpcClient`] turns a method name and params into a JSON-RPC request,
//! sends it over a pooled HTTP [`Transport`](rpc::Transport), matches the
//! response by id, and reports every failure as a distinct [`CoreError`]
//! variant. [`DaemonApi`] layers named methods on top.
//!
//! ```no_run
//! use coinrpc::{DaemonApi, RpcClient, RpcConfig};
//!
//! # async fn run() -> Result<(), coinrpc::CoreError> {
//! let config = RpcConfig::builder("http://127.0.0.1:8332")
//!     .user("rpcuser")
//!     .pass("rpcpass")
//!     .build()?;
//! let count = RpcClient::new(config)
//!     .scope(|rpc| async move { rpc.get_block_count().await })
//!     .await?;
//! println!("{count} blocks");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod methods;
pub mod rpc;

pub use config::{RpcConfig, RpcConfigBuilder};
pub use error::{CoreError, RpcError, TransportError};
pub use methods::DaemonApi;
pub use rpc::{Call, Params, RpcClient};
