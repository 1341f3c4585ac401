mod cli;

use std::time::Duration;

use clap::Parser;
use coinrpc::{CoreError, RpcClient, RpcConfig, TransportError};
use eyre::{eyre, WrapErr};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let params = args.params()?;

    let mut builder = RpcConfig::builder(&args.rpc_url)
        .timeout(Duration::from_secs(args.timeout_secs))
        .pool_size(args.pool_size);
    if let Some(user) = &args.rpc_user {
        builder = builder.user(user);
    }
    if let Some(pass) = &args.rpc_pass {
        builder = builder.pass(pass);
    }
    if let Some(cookie) = &args.rpc_cookie {
        builder = builder.cookie_file(cookie);
    }
    let config = builder.build().context("build RPC client configuration")?;

    tracing::debug!(url = %args.rpc_url, method = %args.method, "calling daemon");
    let method = args.method.clone();
    let result = RpcClient::new(config)
        .scope(|rpc| async move { rpc.invoke(&method, params).await })
        .await;

    match result {
        Ok(value) => {
            let rendered =
                serde_json::to_string_pretty(&value).context("render result as JSON")?;
            println!("{rendered}");
            Ok(())
        }
        Err(CoreError::Rpc(err)) => Err(eyre!(
            "error code: {}\nerror message:\n{}",
            err.code,
            err.message
        )),
        Err(err) => {
            let message = format_rpc_error(&args.rpc_url, &err);
            Err(eyre!(message).wrap_err(format!("while calling `{}`", args.method)))
        }
    }
}

fn format_rpc_error(rpc_url: &str, err: &CoreError) -> String {
    let mut lines = vec![
        format!("RPC call to `{rpc_url}` failed"),
        format!("RPC error: {err}"),
    ];

    let hint = match err {
        CoreError::Transport(TransportError::Status { status: 401 | 403, .. }) => {
            Some("hint: authentication failed; verify --rpc-user/--rpc-pass or --rpc-cookie")
        }
        CoreError::Transport(TransportError::Status { status: 404, .. }) => {
            Some("hint: endpoint path is invalid; verify the full RPC URL including any wallet path")
        }
        CoreError::Transport(TransportError::Request(source)) if source.is_connect() => {
            Some("hint: could not connect; verify the daemon is running and the RPC port is reachable")
        }
        CoreError::Transport(TransportError::Request(source)) => {
            let detail = format!("{source:?}");
            if detail.contains("dns error") {
                Some("hint: hostname resolution failed; verify the endpoint hostname and your DNS/network")
            } else if detail.contains("tls") || detail.contains("certificate") {
                Some("hint: TLS handshake failed; verify certificate trust and that the endpoint uses HTTPS")
            } else {
                None
            }
        }
        CoreError::Timeout { .. } => Some("hint: the daemon is slow to answer; raise --timeout-secs"),
        _ => None,
    };
    if let Some(hint) = hint {
        lines.push(hint.to_owned());
    }

    lines.join("\n")
}
