//! Discovery — is a coordination service already listening on the fixed port?
//!
//! The probe is `GET /healthz` with a bounded timeout. Only a body carrying
//! this service's name and protocol version counts as healthy, so an
//! unrelated program that happens to own the port is treated as absent.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;

pub const SERVICE_NAME: &str = "boardlink";
pub const PROTOCOL_VERSION: u32 = 1;

/// Body of `GET /healthz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub service: String,
    pub protocol: u32,
}

impl Health {
    #[must_use]
    pub fn current() -> Self {
        Self { service: SERVICE_NAME.to_owned(), protocol: PROTOCOL_VERSION }
    }
}

#[derive(Debug, Clone)]
pub struct Discovery {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl Discovery {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_address(&config.host, config.port, config.health_timeout)
    }

    #[must_use]
    pub fn with_address(host: &str, port: u16, timeout: Duration) -> Self {
        // Every probe opens a fresh connection; a pooled one could still
        // reach a leader that has already stopped listening.
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_default();
        Self { http, url: format!("http://{host}:{port}"), timeout }
    }

    /// Base URL of the fixed endpoint, whether or not anything is listening.
    #[must_use]
    pub fn get_server_url(&self) -> &str {
        &self.url
    }

    /// True when a compatible service answers the health probe in time.
    pub async fn check_server_health(&self) -> bool {
        match self.probe().await {
            Ok(health) if health == Health::current() => true,
            Ok(health) => {
                debug!(url = %self.url, service = %health.service, protocol = health.protocol, "discovery: incompatible service");
                false
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "discovery: no healthy service");
                false
            }
        }
    }

    async fn probe(&self) -> Result<Health, reqwest::Error> {
        self.http
            .get(format!("{}/healthz", self.url))
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<Health>()
            .await
    }
}

#[cfg(test)]
#[path = "discovery_test.rs"]
mod tests;
