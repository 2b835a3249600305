//! Launcher — decides whether this instance leads or follows.
//!
//! DECISION
//! ========
//! 1. Discovery disabled → bind directly; a bind failure is terminal.
//! 2. A healthy service already answers → follow it as a client.
//! 3. Otherwise bind. Losing the bind race is expected: wait the settle
//!    delay, probe once more, and follow the winner if it is healthy.
//!    Nobody healthy after the race → disabled.
//!
//! Failover re-enters step 3 when the leader is lost, but only when both
//! discovery and failover are enabled.

use tracing::{error, info};

use crate::config::{Config, Flag};
use crate::discovery::Discovery;
use crate::server::{self, ServerError, ServerHandle};

/// Terminal result of one launch attempt.
#[derive(Debug)]
pub enum LaunchOutcome {
    /// This instance holds the port.
    Server(ServerHandle),
    /// Another instance leads at `url`.
    Client { url: String },
    /// No usable service; only an explicit retry recovers.
    Disabled { error: String },
}

impl LaunchOutcome {
    #[must_use]
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Server(_) => "server",
            Self::Client { .. } => "client",
            Self::Disabled { .. } => "disabled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Launcher {
    config: Config,
    auth_token: String,
    discovery: Discovery,
}

impl Launcher {
    #[must_use]
    pub fn new(config: Config, auth_token: impl Into<String>) -> Self {
        let discovery = Discovery::new(&config);
        Self { config, auth_token: auth_token.into(), discovery }
    }

    #[must_use]
    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn initialize(&self) -> LaunchOutcome {
        let flags = self.config.flags;
        info!(
            discovery = flags.enable_server_discovery,
            workspace_websockets = flags.enable_workspace_websockets,
            failover = flags.enable_server_failover,
            "launcher: initializing"
        );

        if !flags.is_enabled(Flag::ServerDiscovery) {
            info!("launcher: discovery disabled, launching directly");
            return match self.launch().await {
                Ok(handle) => LaunchOutcome::Server(handle),
                Err(e) => {
                    error!(error = %e, "launcher: direct launch failed");
                    LaunchOutcome::Disabled { error: e.to_string() }
                }
            };
        }

        if self.discovery.check_server_health().await {
            let url = self.discovery.get_server_url().to_owned();
            info!(%url, "launcher: existing service found, following");
            return LaunchOutcome::Client { url };
        }

        self.attempt_server_launch().await
    }

    /// Try to take the port, falling back to following whoever won it.
    pub async fn attempt_server_launch(&self) -> LaunchOutcome {
        let launch_error = match self.launch().await {
            Ok(handle) => {
                info!(addr = %handle.local_addr(), "launcher: leading");
                return LaunchOutcome::Server(handle);
            }
            Err(e) => e,
        };

        info!(
            error = %launch_error,
            addr_in_use = launch_error.is_addr_in_use(),
            "launcher: bind failed, likely lost a race"
        );
        tokio::time::sleep(self.config.settle_delay).await;

        if self.discovery.check_server_health().await {
            let url = self.discovery.get_server_url().to_owned();
            info!(%url, "launcher: following race winner");
            return LaunchOutcome::Client { url };
        }

        error!(error = %launch_error, "launcher: no service available after race");
        LaunchOutcome::Disabled {
            error: format!("failed to launch server and no existing server found: {launch_error}"),
        }
    }

    /// Take over after the leader was lost. `None` means failover is off
    /// and nothing was attempted.
    pub async fn handle_server_failover(&self) -> Option<LaunchOutcome> {
        if !self.should_attempt_failover() {
            info!("launcher: failover disabled, not attempting");
            return None;
        }
        info!("launcher: leader lost, attempting failover");
        Some(self.attempt_server_launch().await)
    }

    #[must_use]
    pub fn should_attempt_failover(&self) -> bool {
        self.config.flags.is_enabled(Flag::ServerDiscovery) && self.config.flags.is_enabled(Flag::ServerFailover)
    }

    async fn launch(&self) -> Result<ServerHandle, ServerError> {
        server::bind(&self.config, &self.auth_token).await
    }
}

#[cfg(test)]
#[path = "launcher_test.rs"]
mod tests;
