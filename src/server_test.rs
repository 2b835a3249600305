use super::*;
use crate::config::FeatureFlags;
use crate::config::test_helpers::{free_port, test_config};
use crate::discovery::Discovery;

#[tokio::test]
async fn bound_server_answers_health_probe() {
    let config = test_config(free_port(), FeatureFlags::default());
    let handle = bind(&config, "token").await.unwrap();

    assert_eq!(handle.local_addr().port(), config.port);
    assert!(Discovery::new(&config).check_server_health().await);

    handle.shutdown().await;
}

#[tokio::test]
async fn second_bind_on_same_port_fails_as_addr_in_use() {
    let config = test_config(free_port(), FeatureFlags::default());
    let handle = bind(&config, "token").await.unwrap();

    let err = bind(&config, "token").await.unwrap_err();
    assert!(err.is_addr_in_use(), "unexpected error: {err}");

    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_releases_the_port() {
    let config = test_config(free_port(), FeatureFlags::default());
    let handle = bind(&config, "token").await.unwrap();
    handle.shutdown().await;

    assert!(!Discovery::new(&config).check_server_health().await);
    let again = bind(&config, "token").await.unwrap();
    again.shutdown().await;
}
