//! Process configuration parsed from environment variables.
//!
//! Everything is read once at startup into [`Config`] and shared read-only
//! afterwards. Parsing goes through a lookup function so tests can supply
//! variables without touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::Backoff;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9042;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_BACKOFF_FLOOR_MS: u64 = 500;
pub const DEFAULT_BACKOFF_CEILING_MS: u64 = 10_000;
pub const DEFAULT_BACKOFF_JITTER_MS: u64 = 500;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a boolean (1/0, true/false, yes/no, on/off), got {value:?}")]
    InvalidFlag { var: &'static str, value: String },
}

// =============================================================================
// FEATURE FLAGS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    ServerDiscovery,
    WorkspaceWebsockets,
    ServerFailover,
}

/// Leader-election switches. All default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub enable_server_discovery: bool,
    pub enable_workspace_websockets: bool,
    pub enable_server_failover: bool,
}

impl FeatureFlags {
    #[must_use]
    pub fn is_enabled(&self, flag: Flag) -> bool {
        match flag {
            Flag::ServerDiscovery => self.enable_server_discovery,
            Flag::WorkspaceWebsockets => self.enable_workspace_websockets,
            Flag::ServerFailover => self.enable_server_failover,
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub flags: FeatureFlags,
    /// Wait after a lost bind race before re-probing.
    pub settle_delay: Duration,
    pub health_timeout: Duration,
    /// Must be nonzero; the pending sweep ticks at this period.
    pub query_timeout: Duration,
    /// Limit on each websocket handshake with the leader.
    pub connect_timeout: Duration,
    pub backoff: Backoff,
    pub token_path: PathBuf,
    /// Static board-side app served at `/` when set.
    pub public_dir: Option<PathBuf>,
}

impl Config {
    /// Build config from the process environment.
    ///
    /// Optional:
    /// - `BOARDLINK_HOST`, `BOARDLINK_PORT`: default `127.0.0.1:9042`
    /// - `BOARDLINK_ENABLE_SERVER_DISCOVERY`, `BOARDLINK_ENABLE_WORKSPACE_WEBSOCKETS`,
    ///   `BOARDLINK_ENABLE_SERVER_FAILOVER`: default off
    /// - `BOARDLINK_SETTLE_DELAY_MS`: default 1000
    /// - `BOARDLINK_HEALTH_TIMEOUT_MS`: default 1000
    /// - `BOARDLINK_QUERY_TIMEOUT_SECS`: default 30
    /// - `BOARDLINK_CONNECT_TIMEOUT_MS`: default 5000
    /// - `BOARDLINK_BACKOFF_FLOOR_MS` / `_CEILING_MS` / `_JITTER_MS`: default 500 / 10000 / 500
    /// - `BOARDLINK_TOKEN_PATH`: default `$HOME/.boardlink/token`
    /// - `BOARDLINK_PUBLIC_DIR`: unset
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFlag`] for a flag that is not a boolean.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFlag`] for a flag that is not a boolean.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let flags = FeatureFlags {
            enable_server_discovery: parse_flag(&lookup, "BOARDLINK_ENABLE_SERVER_DISCOVERY")?,
            enable_workspace_websockets: parse_flag(&lookup, "BOARDLINK_ENABLE_WORKSPACE_WEBSOCKETS")?,
            enable_server_failover: parse_flag(&lookup, "BOARDLINK_ENABLE_SERVER_FAILOVER")?,
        };

        let backoff = Backoff::new(
            Duration::from_millis(parse_or(&lookup, "BOARDLINK_BACKOFF_FLOOR_MS", DEFAULT_BACKOFF_FLOOR_MS)),
            Duration::from_millis(parse_or(&lookup, "BOARDLINK_BACKOFF_CEILING_MS", DEFAULT_BACKOFF_CEILING_MS)),
            Duration::from_millis(parse_or(&lookup, "BOARDLINK_BACKOFF_JITTER_MS", DEFAULT_BACKOFF_JITTER_MS)),
        );

        let token_path = lookup("BOARDLINK_TOKEN_PATH").map_or_else(
            || {
                lookup("HOME")
                    .map_or_else(|| PathBuf::from("."), PathBuf::from)
                    .join(".boardlink")
                    .join("token")
            },
            PathBuf::from,
        );

        Ok(Self {
            host: lookup("BOARDLINK_HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: parse_or(&lookup, "BOARDLINK_PORT", DEFAULT_PORT),
            flags,
            settle_delay: Duration::from_millis(parse_or(&lookup, "BOARDLINK_SETTLE_DELAY_MS", DEFAULT_SETTLE_DELAY_MS)),
            health_timeout: Duration::from_millis(parse_or(
                &lookup,
                "BOARDLINK_HEALTH_TIMEOUT_MS",
                DEFAULT_HEALTH_TIMEOUT_MS,
            )),
            query_timeout: Duration::from_secs(parse_nonzero_or(
                &lookup,
                "BOARDLINK_QUERY_TIMEOUT_SECS",
                DEFAULT_QUERY_TIMEOUT_SECS,
            )),
            connect_timeout: Duration::from_millis(parse_nonzero_or(
                &lookup,
                "BOARDLINK_CONNECT_TIMEOUT_MS",
                DEFAULT_CONNECT_TIMEOUT_MS,
            )),
            backoff,
            token_path,
            public_dir: lookup("BOARDLINK_PUBLIC_DIR").map(PathBuf::from),
        })
    }

    /// `host:port` the coordination service binds.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Zero counts as unparseable.
fn parse_nonzero_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    match parse_or(lookup, key, default) {
        0 => default,
        n => n,
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { var, value: raw }),
    }
}


#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
