use std::env;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{CollabError, Result};
use crate::executor::ExecutorConfig;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_EXECUTOR_URL: &str = "http://127.0.0.1:2358";
const DEFAULT_EXECUTOR_TIMEOUT_SECS: u64 = 30;

// One executor call is a single compile-and-run round trip; a deadline
// beyond this is a misconfiguration, not a slow program.
const MAX_EXECUTOR_TIMEOUT_SECS: u64 = 300;

/// Server configuration, loaded once at startup. Malformed values are
/// reported as configuration errors instead of being silently replaced
/// with defaults.
pub struct Config {
    pub bind: SocketAddr,
    pub executor: ExecutorConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let host = env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var("SERVER_PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
        let executor_url =
            env::var("EXECUTOR_URL").unwrap_or_else(|_| DEFAULT_EXECUTOR_URL.to_string());
        let executor_timeout = env::var("EXECUTOR_TIMEOUT_SECS").ok();

        Ok(Self {
            bind: parse_bind(&host, &port)?,
            executor: parse_executor(&executor_url, executor_timeout.as_deref())?,
        })
    }
}

/// Resolve the listen address. Hostnames are allowed (`localhost`
/// included); the first resolved address wins.
fn parse_bind(host: &str, port: &str) -> Result<SocketAddr> {
    let port: u16 = port.parse().map_err(|_| {
        CollabError::InvalidConfiguration(format!("SERVER_PORT is not a port number: {}", port))
    })?;

    (host, port)
        .to_socket_addrs()
        .map_err(|e| {
            CollabError::InvalidConfiguration(format!(
                "SERVER_HOST {} does not resolve: {}",
                host, e
            ))
        })?
        .next()
        .ok_or_else(|| {
            CollabError::InvalidConfiguration(format!(
                "SERVER_HOST {} resolves to no address",
                host
            ))
        })
}

/// Executor endpoint and deadline. The URL must be plain http(s) and any
/// trailing slash is dropped so request paths join cleanly.
fn parse_executor(url: &str, timeout_secs: Option<&str>) -> Result<ExecutorConfig> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(CollabError::InvalidConfiguration(format!(
            "EXECUTOR_URL must start with http:// or https://, got: {}",
            url
        )));
    }
    let base_url = url.trim_end_matches('/').to_string();

    let timeout_secs = match timeout_secs {
        Some(raw) => {
            let secs: u64 = raw.parse().map_err(|_| {
                CollabError::InvalidConfiguration(format!(
                    "EXECUTOR_TIMEOUT_SECS is not a number of seconds: {}",
                    raw
                ))
            })?;
            if secs == 0 || secs > MAX_EXECUTOR_TIMEOUT_SECS {
                return Err(CollabError::InvalidConfiguration(format!(
                    "EXECUTOR_TIMEOUT_SECS must be between 1 and {}, got: {}",
                    MAX_EXECUTOR_TIMEOUT_SECS, secs
                )));
            }
            secs
        }
        None => DEFAULT_EXECUTOR_TIMEOUT_SECS,
    };

    Ok(ExecutorConfig {
        base_url,
        timeout_secs,
    })
}
