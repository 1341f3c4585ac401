use std::path::PathBuf;

use clap::Parser;
use coinrpc::Params;
use eyre::eyre;
use serde_json::Value;

/// coinrpc: call any JSON-RPC method on a Bitcoin Core compatible daemon.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Daemon RPC URL.
    #[arg(long, default_value = "http://127.0.0.1:8332", env = "COINRPC_RPC_URL")]
    pub rpc_url: String,

    /// RPC username.
    #[arg(long, env = "COINRPC_RPC_USER")]
    pub rpc_user: Option<String>,

    /// RPC password.
    #[arg(long, env = "COINRPC_RPC_PASS")]
    pub rpc_pass: Option<String>,

    /// Cookie file with `user:password`, used when no user/pass is given.
    #[arg(long, env = "COINRPC_RPC_COOKIE")]
    pub rpc_cookie: Option<PathBuf>,

    /// Per-call timeout in seconds.
    #[arg(long, default_value = "5")]
    pub timeout_secs: u64,

    /// Maximum idle pooled connections.
    #[arg(long, default_value = "32")]
    pub pool_size: usize,

    /// Pass params as `key=value` pairs instead of positional values.
    #[arg(long)]
    pub named: bool,

    /// Method name, e.g. `getblockcount`.
    pub method: String,

    /// Params. Each is parsed as JSON and falls back to a plain string.
    pub params: Vec<String>,
}

impl Cli {
    pub fn params(&self) -> eyre::Result<Params> {
        if self.params.is_empty() {
            return Ok(Params::None);
        }
        if !self.named {
            return Ok(Params::Positional(
                self.params.iter().map(|raw| parse_value(raw)).collect(),
            ));
        }

        let mut named = serde_json::Map::new();
        for raw in &self.params {
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| eyre!("named param `{raw}` must look like key=value"))?;
            if key.is_empty() {
                return Err(eyre!("named param `{raw}` has an empty key"));
            }
            named.insert(key.to_owned(), parse_value(value));
        }
        Ok(Params::Named(named))
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}
