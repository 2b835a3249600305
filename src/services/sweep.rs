//! Pending sweep — background cleanup of abandoned board queries.
//!
//! DESIGN
//! ======
//! A caller that times out cancels its own entry, but a caller whose future
//! is dropped mid-wait leaves the entry behind. Once per query timeout the
//! sweep drops every entry older than that timeout from every live link. A
//! result arriving later is discarded as unmatched.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::state::AppState;

/// `interval` rejects a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Spawn the sweep task. It exits when the server shuts down.
pub fn spawn_pending_sweep(state: AppState) -> JoinHandle<()> {
    let period = state.query_timeout.max(MIN_PERIOD);
    info!(period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "pending sweep configured");
    let mut shutdown = state.shutdown_signal();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_once(&state).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Expire stale entries on every link. Returns how many were dropped.
pub async fn sweep_once(state: &AppState) -> usize {
    let links: Vec<_> = state.links.read().await.values().cloned().collect();
    let expired: usize = links
        .iter()
        .map(|link| link.pending().expire(state.query_timeout))
        .sum();
    if expired > 0 {
        debug!(expired, "pending sweep: dropped abandoned queries");
    }
    expired
}

#[cfg(test)]
#[path = "sweep_test.rs"]
mod tests;
