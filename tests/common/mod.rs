//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rpc_gateway::config::ServiceConfig;
use rpc_gateway::resilience::BackoffKind;
use rpc_gateway::transport::{Payload, RpcServer, RpcStatus};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A running instance on an ephemeral port.
pub struct TestInstance {
    pub address: String,
    pub hits: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl TestInstance {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for TestInstance {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Serve `server` on 127.0.0.1 with an OS-assigned port.
pub async fn start_instance(server: RpcServer, hits: Arc<AtomicUsize>) -> TestInstance {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.serve(listener, token).await;
    });
    TestInstance {
        address,
        hits,
        shutdown,
    }
}

/// Start a programmable instance answering `service.method` with `f`.
pub async fn start_programmable_instance<F>(service: &str, method: &str, f: F) -> TestInstance
where
    F: Fn(usize, Payload) -> Result<Payload, RpcStatus> + Send + Sync + 'static,
{
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let f = Arc::new(f);
    let server = RpcServer::new().method(service, method, move |request| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let f = f.clone();
        async move { f(n, request) }
    });
    start_instance(server, hits).await
}

/// Instance whose `feed.GetFeeds` answers with its own tag.
pub async fn start_healthy_instance(tag: &'static str) -> TestInstance {
    start_programmable_instance("feed", "GetFeeds", move |_, _| Ok(json!({"served_by": tag}))).await
}

/// Instance whose `feed.GetFeeds` always fails.
pub async fn start_failing_instance() -> TestInstance {
    start_programmable_instance("feed", "GetFeeds", |_, _| {
        Err(RpcStatus::unavailable("instance is failing"))
    })
    .await
}

/// An address nothing listens on.
pub fn dead_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

/// Service config with short delays suited to tests.
pub fn test_config(name: &str, instances: &[&str]) -> ServiceConfig {
    let mut config = ServiceConfig::new(name);
    config.instances = instances.iter().map(|a| a.to_string()).collect();
    config.retries.backoff = BackoffKind::Fixed;
    config.retries.base_delay_ms = 10;
    config
}
