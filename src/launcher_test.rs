use super::*;
use crate::config::FeatureFlags;
use crate::config::test_helpers::{all_flags, free_port, test_config};

fn launcher(port: u16, flags: FeatureFlags) -> Launcher {
    Launcher::new(test_config(port, flags), "token")
}

async fn shutdown(outcome: LaunchOutcome) {
    if let LaunchOutcome::Server(handle) = outcome {
        handle.shutdown().await;
    }
}

#[tokio::test]
async fn discovery_disabled_launches_directly() {
    let port = free_port();
    let outcome = launcher(port, FeatureFlags::default()).initialize().await;
    assert_eq!(outcome.mode_name(), "server");

    let second = launcher(port, FeatureFlags::default()).initialize().await;
    let LaunchOutcome::Disabled { error } = &second else {
        panic!("expected disabled, got {second:?}");
    };
    assert!(error.contains("failed to bind"));

    shutdown(outcome).await;
}

#[tokio::test]
async fn healthy_service_is_followed() {
    let port = free_port();
    let leader = launcher(port, all_flags()).initialize().await;
    assert_eq!(leader.mode_name(), "server");

    let follower = launcher(port, all_flags()).initialize().await;
    let LaunchOutcome::Client { url } = &follower else {
        panic!("expected client, got {follower:?}");
    };
    assert_eq!(url, &format!("http://127.0.0.1:{port}"));

    shutdown(leader).await;
}

#[tokio::test]
async fn racing_instances_elect_exactly_one_leader() {
    let port = free_port();
    let a = launcher(port, all_flags());
    let b = launcher(port, all_flags());

    let (first, second) = tokio::join!(a.initialize(), b.initialize());
    let mut modes = vec![first.mode_name(), second.mode_name()];
    modes.sort_unstable();
    assert_eq!(modes, vec!["client", "server"]);

    for outcome in [&first, &second] {
        if let LaunchOutcome::Client { url } = outcome {
            assert_eq!(url, &format!("http://127.0.0.1:{port}"));
        }
    }

    shutdown(first).await;
    shutdown(second).await;
}

#[tokio::test]
async fn foreign_listener_on_port_disables() {
    let squatter = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = squatter.local_addr().unwrap().port();

    let outcome = launcher(port, all_flags()).initialize().await;
    let LaunchOutcome::Disabled { error } = &outcome else {
        panic!("expected disabled, got {outcome:?}");
    };
    assert!(error.contains("no existing server found"));
    drop(squatter);
}

#[tokio::test]
async fn failover_requires_both_flags() {
    let discovery_only = FeatureFlags { enable_server_discovery: true, ..FeatureFlags::default() };
    assert!(!launcher(free_port(), discovery_only).should_attempt_failover());
    assert!(launcher(free_port(), discovery_only).handle_server_failover().await.is_none());

    let failover_only = FeatureFlags { enable_server_failover: true, ..FeatureFlags::default() };
    assert!(!launcher(free_port(), failover_only).should_attempt_failover());

    assert!(launcher(free_port(), all_flags()).should_attempt_failover());
}

#[tokio::test]
async fn failover_takes_over_a_released_port() {
    let port = free_port();
    let leader = launcher(port, all_flags()).initialize().await;
    let follower = launcher(port, all_flags());
    assert_eq!(follower.initialize().await.mode_name(), "client");

    shutdown(leader).await;

    let outcome = follower.handle_server_failover().await.unwrap();
    assert_eq!(outcome.mode_name(), "server");
    shutdown(outcome).await;
}
