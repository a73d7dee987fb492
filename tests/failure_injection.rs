//! Failure injection tests over the real HTTP/2 transport.

use std::sync::Arc;
use std::time::Duration;

use rpc_gateway::config::DiscoveryConfig;
use rpc_gateway::discovery::MemoryRegistry;
use rpc_gateway::resilience::BreakerState;
use rpc_gateway::{CallContext, CallError, ErrorKind, LogicalService};
use serde_json::json;

mod common;

async fn start(config: rpc_gateway::config::ServiceConfig) -> LogicalService {
    let expected = config.instances.len();
    let service = LogicalService::builder(config).build();
    service.wait_for(|s| s.len() == expected).await;
    service
}

#[tokio::test]
async fn test_retry_absorbs_failing_instance() {
    let failing = common::start_failing_instance().await;
    let healthy = common::start_healthy_instance("b").await;

    let mut config = common::test_config("feed", &[&failing.address, &healthy.address]);
    config.retries.max_attempts = 2;
    let service = start(config).await;

    let ctx = CallContext::background();
    for _ in 0..4 {
        let response = service.call(&ctx, "GetFeeds", json!({})).await.unwrap();
        assert_eq!(response, json!({"served_by": "b"}));
    }

    let stats = service.breaker_stats().unwrap();
    assert_eq!(stats.total_successes, 4);
    assert_eq!(stats.total_failures, failing.hits() as u64);
    assert!(failing.hits() >= 1);
    assert_eq!(stats.state, BreakerState::Closed);
}

#[tokio::test]
async fn test_unreachable_instance_is_connection_failure() {
    let dead = common::dead_address();

    let mut config = common::test_config("feed", &[&dead]);
    config.retries.max_attempts = 2;
    let service = start(config).await;

    let err = service
        .call(&CallContext::background(), "GetFeeds", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Connect { .. }));
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert_eq!(service.breaker_stats().unwrap().total_failures, 2);
}

#[tokio::test]
async fn test_unreachable_instance_retried_elsewhere() {
    let dead = common::dead_address();
    let healthy = common::start_healthy_instance("b").await;

    let service = start(common::test_config("feed", &[&dead, &healthy.address])).await;

    let ctx = CallContext::background();
    for _ in 0..6 {
        assert!(service.call(&ctx, "GetFeeds", json!({})).await.is_ok());
    }
    assert_eq!(healthy.hits(), 6);
}

#[tokio::test]
async fn test_breaker_opens_and_stops_traffic() {
    let failing = common::start_failing_instance().await;

    let mut config = common::test_config("feed", &[&failing.address]);
    config.retries.max_attempts = 1;
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.cooldown_ms = 60_000;
    let service = start(config).await;

    let ctx = CallContext::background();
    for _ in 0..3 {
        let err = service.call(&ctx, "GetFeeds", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCallFailed);
    }
    assert_eq!(service.breaker_state(), Some(BreakerState::Open));

    for _ in 0..5 {
        let err = service.call(&ctx, "GetFeeds", json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::CircuitOpen { .. }));
    }
    assert_eq!(failing.hits(), 3);
}

#[tokio::test]
async fn test_remote_recovers_after_transient_failures() {
    let flaky = common::start_programmable_instance("feed", "GetFeeds", |n, request| {
        if n < 2 {
            Err(rpc_gateway::transport::RpcStatus::unavailable("warming up"))
        } else {
            Ok(request)
        }
    })
    .await;

    let service = start(common::test_config("feed", &[&flaky.address])).await;

    let response = service
        .call(&CallContext::background(), "GetFeeds", json!({"user_id": 9}))
        .await
        .unwrap();
    assert_eq!(response, json!({"user_id": 9}));
    assert_eq!(flaky.hits(), 3);
}

#[tokio::test]
async fn test_stopped_instance_traffic_moves_to_survivor() {
    let a = common::start_healthy_instance("a").await;
    let b = common::start_healthy_instance("b").await;

    let mut config = common::test_config("feed", &[&a.address, &b.address]);
    config.circuit_breaker.enabled = false;
    let service = start(config).await;

    let ctx = CallContext::background();
    for _ in 0..4 {
        service.call(&ctx, "GetFeeds", json!({})).await.unwrap();
    }
    assert_eq!(a.hits(), 2);
    assert_eq!(b.hits(), 2);

    a.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;

    for _ in 0..6 {
        let response = service.call(&ctx, "GetFeeds", json!({})).await.unwrap();
        assert_eq!(response, json!({"served_by": "b"}));
    }
    assert_eq!(a.hits(), 2);
}

#[tokio::test]
async fn test_membership_changes_follow_registry() {
    let a = common::start_healthy_instance("a").await;
    let b = common::start_healthy_instance("b").await;

    let registry = MemoryRegistry::new();
    registry.register("feed", &a.address, None);

    let service = LogicalService::builder(common::test_config("feed", &[]))
        .discovery(Arc::new(registry.clone()))
        .build();
    service.wait_for(|s| s.contains(&a.address)).await;

    let ctx = CallContext::background();
    let response = service.call(&ctx, "GetFeeds", json!({})).await.unwrap();
    assert_eq!(response, json!({"served_by": "a"}));

    registry.register("feed", &b.address, None);
    registry.deregister("feed", &a.address);
    service
        .wait_for(|s| s.contains(&b.address) && !s.contains(&a.address))
        .await;
    assert!(!service.connected().contains(&a.address));

    for _ in 0..3 {
        let response = service.call(&ctx, "GetFeeds", json!({})).await.unwrap();
        assert_eq!(response, json!({"served_by": "b"}));
    }
    assert_eq!(a.hits(), 1);
}

#[tokio::test]
async fn test_discovery_outage_keeps_serving_stale_set() {
    let a = common::start_healthy_instance("a").await;
    let b = common::start_healthy_instance("b").await;

    let registry = MemoryRegistry::new();
    registry.register("feed", &a.address, None);

    let settings = DiscoveryConfig {
        retry_base_ms: 20,
        retry_max_ms: 100,
        ..DiscoveryConfig::default()
    };
    let service = LogicalService::builder(common::test_config("feed", &[]))
        .discovery(Arc::new(registry.clone()))
        .discovery_settings(&settings)
        .build();
    service.wait_for(|s| s.contains(&a.address)).await;

    registry.set_available(false);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ctx = CallContext::background();
    let response = service.call(&ctx, "GetFeeds", json!({})).await.unwrap();
    assert_eq!(response, json!({"served_by": "a"}));
    assert!(!service.is_degraded());

    registry.register("feed", &b.address, None);
    registry.set_available(true);
    tokio::time::timeout(
        Duration::from_secs(5),
        service.wait_for(|s| s.contains(&b.address)),
    )
    .await
    .unwrap();
    assert!(service.snapshot().contains(&a.address));
}
