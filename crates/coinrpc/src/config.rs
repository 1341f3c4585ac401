//! Endpoint configuration for [`RpcClient`](crate::rpc::RpcClient).
//!
//! An [`RpcConfig`] is validated once by [`RpcConfigBuilder::build`] and
//! never mutated afterwards.

use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::CoreError;

/// Per-call deadline applied when the caller does not pass one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum concurrent exchanges, and idle pooled connections kept, per client.
pub const DEFAULT_POOL_SIZE: usize = 32;

// ==============================================================================
// Credentials
// ==============================================================================

/// HTTP Basic credentials sent with every request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

// ==============================================================================
// RpcConfig
// ==============================================================================

#[derive(Debug, Clone)]
pub struct RpcConfig {
    url: String,
    credentials: Credentials,
    timeout: Duration,
    connect_timeout: Duration,
    pool_size: usize,
    requests_per_second: Option<NonZeroU32>,
    headers: HeaderMap,
}

impl RpcConfig {
    pub fn builder(url: impl Into<String>) -> RpcConfigBuilder {
        RpcConfigBuilder {
            url: url.into(),
            user: None,
            pass: None,
            cookie_file: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_size: DEFAULT_POOL_SIZE,
            requests_per_second: None,
            headers: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn requests_per_second(&self) -> Option<NonZeroU32> {
        self.requests_per_second
    }

    /// Extra headers attached to every request, on top of content type and auth.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

pub struct RpcConfigBuilder {
    url: String,
    user: Option<String>,
    pass: Option<String>,
    cookie_file: Option<PathBuf>,
    timeout: Duration,
    connect_timeout: Duration,
    pool_size: usize,
    requests_per_second: Option<u32>,
    headers: Vec<(String, String)>,
}

impl RpcConfigBuilder {
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn pass(mut self, pass: impl Into<String>) -> Self {
        self.pass = Some(pass.into());
        self
    }

    /// Read credentials from the daemon's `.cookie` file when no explicit
    /// user and password are set.
    pub fn cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_file = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Limit outbound HTTP requests per second. A batch counts as one request.
    pub fn requests_per_second(mut self, limit: u32) -> Self {
        self.requests_per_second = Some(limit);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<RpcConfig, CoreError> {
        let url = parse_endpoint(&self.url)?;
        let credentials = resolve_auth(
            self.user.as_deref(),
            self.pass.as_deref(),
            self.cookie_file.as_deref(),
        )?;

        if self.pool_size == 0 || self.pool_size > Semaphore::MAX_PERMITS {
            return Err(CoreError::Config(format!(
                "connection pool size must be between 1 and {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.timeout.is_zero() {
            return Err(CoreError::Config("timeout must be non-zero".to_owned()));
        }
        let requests_per_second = match self.requests_per_second {
            None => None,
            Some(limit) => Some(NonZeroU32::new(limit).ok_or_else(|| {
                CoreError::Config("requests_per_second must be at least 1".to_owned())
            })?),
        };
        let headers = parse_headers(self.headers)?;

        Ok(RpcConfig {
            url,
            credentials,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            pool_size: self.pool_size,
            requests_per_second,
            headers,
        })
    }
}

// ==============================================================================
// Validation helpers
// ==============================================================================

/// Explicit user and password win over the cookie file.
fn resolve_auth(
    user: Option<&str>,
    pass: Option<&str>,
    cookie_file: Option<&Path>,
) -> Result<Credentials, CoreError> {
    match (user, pass, cookie_file) {
        (Some(user), Some(pass), _) => Ok(Credentials {
            user: user.to_owned(),
            pass: pass.to_owned(),
        }),
        (None, None, Some(path)) => read_cookie(path),
        (None, None, None) => Err(CoreError::Config(
            "rpc credentials required: set user and pass, or a cookie file".to_owned(),
        )),
        _ => Err(CoreError::Config(
            "both rpc user and rpc pass must be set together".to_owned(),
        )),
    }
}

/// The daemon writes `__cookie__:<hex>` on the first line of its `.cookie` file.
fn read_cookie(path: &Path) -> Result<Credentials, CoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CoreError::Config(format!("cannot read cookie file {}: {e}", path.display()))
    })?;

    content
        .lines()
        .next()
        .and_then(|line| line.trim().split_once(':'))
        .filter(|(user, pass)| !user.is_empty() && !pass.is_empty())
        .map(|(user, pass)| Credentials {
            user: user.to_owned(),
            pass: pass.to_owned(),
        })
        .ok_or_else(|| {
            CoreError::Config(format!(
                "cookie file {} does not start with `user:password`",
                path.display()
            ))
        })
}

fn parse_endpoint(endpoint: &str) -> Result<String, CoreError> {
    let url = Url::parse(endpoint)
        .map_err(|e| CoreError::Config(format!("invalid endpoint `{endpoint}`: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::Config(format!(
            "unsupported endpoint scheme `{}`; the daemon speaks http or https",
            url.scheme()
        )));
    }
    Ok(endpoint.to_owned())
}

fn parse_headers(raw: Vec<(String, String)>) -> Result<HeaderMap, CoreError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| CoreError::Config(format!("invalid header name `{name}`: {e}")))?;
        if name == AUTHORIZATION {
            return Err(CoreError::Config(
                "authentication cannot be set through extra headers".to_owned(),
            ));
        }
        if name == CONTENT_TYPE {
            warn!(value = %value, "ignoring content-type override; requests are always JSON");
            continue;
        }
        let value = HeaderValue::from_str(&value)
            .map_err(|e| CoreError::Config(format!("invalid value for header `{name}`: {e}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}
