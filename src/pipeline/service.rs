//! Logical service: the unit that owns membership, admission, fault
//! isolation and connections for one named remote service.
//!
//! # Responsibilities
//! - Own the InstanceSet, RateLimiter, CircuitBreaker and ConnectorFactory
//! - Run the discovery feed and apply its events in a background task
//! - Release connections of retired instances
//! - Execute calls through the ordered stage list
//!
//! # Call Flow
//! ```text
//! Observe → Admission (rate limiter) → Breaker (gate permit) → Retry:
//!     attempt n: breaker re-check (n > 1) → balancer pick
//!         → connector get → Connection::invoke (per-attempt timeout)
//!         → outcome recorded on the attempt's permit
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::schema::{DiscoveryConfig, ServiceConfig};
use crate::context::CallContext;
use crate::discovery::{Discovery, FeedUpdate, MemoryRegistry, MembershipEvent, RegistryFeed};
use crate::error::{CallError, CallResult};
use crate::load_balancer::{InstanceSet, LoadBalancer, Snapshot};
use crate::observability::metrics;
use crate::observability::{CallEvent, CallObserver, LogObserver, MetricsObserver};
use crate::pipeline::method::{CallPipeline, Method};
use crate::pipeline::Stage;
use crate::resilience::backoff::Backoff;
use crate::resilience::circuit_breaker::{
    BreakerState, BreakerStats, CircuitBreaker, Outcome, Permit,
};
use crate::resilience::rate_limit::RateLimiter;
use crate::resilience::retries::{Attempt, RetryPolicy};
use crate::transport::{ConnectorFactory, Dialer, HttpDialer, Payload};

pub(crate) struct ServiceCore {
    name: String,
    stages: Vec<Stage>,
    instances: Arc<InstanceSet>,
    balancer: Box<dyn LoadBalancer>,
    connector: ConnectorFactory,
    limiter: Option<RateLimiter>,
    breaker: Option<CircuitBreaker>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    observers: Vec<Arc<dyn CallObserver>>,
    degraded: Mutex<Option<String>>,
    version_tx: watch::Sender<u64>,
}

impl ServiceCore {
    fn apply(&self, event: &MembershipEvent) {
        let Some(applied) = self.instances.apply(event) else {
            return;
        };

        for address in &applied.retired {
            self.connector.release(address);
        }

        let size = self.instances.snapshot().len();
        metrics::record_instances(&self.name, size);
        tracing::info!(
            service = %self.name,
            version = applied.version,
            added = ?applied.added,
            retired = ?applied.retired,
            instances = size,
            "Instance set updated"
        );
        self.version_tx.send_replace(applied.version);
    }

    fn set_degraded(&self, reason: Option<String>) {
        *self.degraded.lock().unwrap_or_else(PoisonError::into_inner) = reason;
    }

    fn degraded(&self) -> Option<String> {
        self.degraded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one external call. `encode` and `decode` run inside the observed
    /// scope, so codec failures are reported like any other call error.
    pub(crate) async fn call<T>(
        &self,
        ctx: &CallContext,
        method: &str,
        encode: impl FnOnce() -> CallResult<Payload>,
        decode: impl FnOnce(Payload) -> CallResult<T>,
    ) -> CallResult<T> {
        let call_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "rpc_call",
            call_id = %call_id,
            service = %self.name,
            method = %method
        );

        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let observe = self.stages.contains(&Stage::Observe);

        let result: CallResult<T> = async {
            let request = encode()?;
            let mut gate = None;
            for stage in &self.stages {
                match stage {
                    Stage::Observe => {}
                    Stage::Admission => {
                        if let Some(limiter) = &self.limiter {
                            limiter.admit(ctx).await?;
                        }
                    }
                    Stage::Breaker => {
                        if let Some(breaker) = &self.breaker {
                            gate = Some(breaker.acquire()?);
                        }
                    }
                    Stage::Retry => break,
                }
            }
            let response = self
                .run_attempts(ctx, method, &request, gate, &attempts)
                .await?;
            decode(response)
        }
        .instrument(span)
        .await;

        if observe {
            let event = CallEvent {
                call_id,
                service: &self.name,
                method,
                attempts: attempts.load(Ordering::Relaxed),
                elapsed: started.elapsed(),
                error: result.as_ref().err(),
            };
            for observer in &self.observers {
                observer.on_call(&event);
            }
        }

        result
    }

    async fn run_attempts<'a>(
        &'a self,
        ctx: &CallContext,
        method: &str,
        request: &Payload,
        gate: Option<Permit<'a>>,
        attempts: &AtomicU32,
    ) -> CallResult<Payload> {
        let mut gate = gate;
        self.retry
            .execute(ctx, |attempt| {
                attempts.fetch_add(1, Ordering::Relaxed);
                let permit = gate.take();
                async move { self.attempt(attempt, method, request, permit).await }
            })
            .await
    }

    async fn attempt<'a>(
        &'a self,
        attempt: Attempt,
        method: &str,
        request: &Payload,
        permit: Option<Permit<'a>>,
    ) -> CallResult<Payload> {
        // Later attempts re-check the breaker so one that opened mid-sequence
        // stops the retries.
        let permit = match (permit, &self.breaker) {
            (Some(permit), _) => Some(permit),
            (None, Some(breaker)) => Some(breaker.acquire()?),
            (None, None) => None,
        };

        let result = self.invoke_once(&attempt, method, request).await;

        if let Some(permit) = permit {
            let outcome = match &result {
                Ok(_) => Outcome::Success,
                Err(e) if e.counts_against_breaker() => Outcome::Failure,
                Err(_) => Outcome::Ignored,
            };
            permit.record(outcome);
        }
        result
    }

    async fn invoke_once(
        &self,
        attempt: &Attempt,
        method: &str,
        request: &Payload,
    ) -> CallResult<Payload> {
        let snapshot = self.instances.snapshot();
        let instance = self
            .balancer
            .pick(&snapshot)
            .ok_or_else(|| CallError::NoInstances {
                service: self.name.clone(),
            })?;
        let address = instance.address();

        let timeout = self.attempt_timeout;
        let result = attempt
            .ctx
            .run(async {
                let invocation = async {
                    let connection = self.connector.get(&instance).await?;
                    connection
                        .invoke(method, request.clone())
                        .await
                        .map_err(|source| CallError::Remote {
                            address: address.to_string(),
                            method: method.to_string(),
                            source,
                        })
                };
                match tokio::time::timeout(timeout, invocation).await {
                    Ok(result) => result,
                    Err(_) => Err(CallError::AttemptTimeout {
                        address: address.to_string(),
                        method: method.to_string(),
                        timeout,
                    }),
                }
            })
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind().as_str(),
        };
        metrics::record_attempt(&self.name, address, outcome);
        match &result {
            Ok(_) => tracing::debug!(
                attempt = attempt.number,
                address = %address,
                "Attempt succeeded"
            ),
            Err(e) => tracing::debug!(
                attempt = attempt.number,
                address = %address,
                error = %e,
                "Attempt failed"
            ),
        }
        result
    }
}

/// Aborts the service's background tasks when the last handle goes away.
struct TaskGuard {
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Cheap, cloneable handle to one logical service.
#[derive(Clone)]
pub struct LogicalService {
    core: Arc<ServiceCore>,
    _tasks: Arc<TaskGuard>,
}

/// Admin view of a service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub version: u64,
    pub instances: Vec<String>,
    pub connected: Vec<String>,
    pub breaker: Option<BreakerStats>,
    pub degraded: Option<String>,
    pub stages: Vec<Stage>,
}

impl LogicalService {
    pub fn builder(config: ServiceConfig) -> ServiceBuilder {
        ServiceBuilder::new(config)
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Untyped call of `method`.
    pub async fn call(
        &self,
        ctx: &CallContext,
        method: &str,
        request: Payload,
    ) -> CallResult<Payload> {
        self.core.call(ctx, method, move || Ok(request), Ok).await
    }

    /// Call with a request encoder and response decoder that are observed
    /// as part of the call.
    pub(crate) async fn call_with<T>(
        &self,
        ctx: &CallContext,
        method: &str,
        encode: impl FnOnce() -> CallResult<Payload>,
        decode: impl FnOnce(Payload) -> CallResult<T>,
    ) -> CallResult<T> {
        self.core.call(ctx, method, encode, decode).await
    }

    /// Untyped per-method handle.
    pub fn pipeline(&self, method: &str) -> CallPipeline {
        CallPipeline::new(self.clone(), method)
    }

    /// Typed per-method handle.
    pub fn method<Req, Resp>(&self, method: &str) -> Method<Req, Resp> {
        Method::new(self.pipeline(method))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.core.stages
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.core.instances.snapshot()
    }

    /// Breaker state, or `None` when the breaker is disabled.
    pub fn breaker_state(&self) -> Option<BreakerState> {
        self.core.breaker.as_ref().map(|b| b.state())
    }

    pub fn breaker_stats(&self) -> Option<BreakerStats> {
        self.core.breaker.as_ref().map(|b| b.stats())
    }

    /// Set when discovery never produced a first subscription.
    pub fn is_degraded(&self) -> bool {
        self.core.degraded().is_some()
    }

    /// Addresses with an open transport connection.
    pub fn connected(&self) -> Vec<String> {
        self.core.connector.connected()
    }

    /// Wait until the instance set satisfies `ready`.
    pub async fn wait_for(&self, ready: impl Fn(&Snapshot) -> bool) {
        let mut versions = self.core.version_tx.subscribe();
        loop {
            if ready(&self.snapshot()) {
                return;
            }
            if versions.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn status(&self) -> ServiceStatus {
        let snapshot = self.snapshot();
        ServiceStatus {
            name: self.core.name.clone(),
            version: snapshot.version(),
            instances: snapshot.addresses(),
            connected: self.connected(),
            breaker: self.breaker_stats(),
            degraded: self.core.degraded(),
            stages: self.core.stages.clone(),
        }
    }

    /// Close every cached connection.
    pub fn close(&self) {
        self.core.connector.release_all();
    }
}

impl std::fmt::Debug for LogicalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalService")
            .field("name", &self.core.name)
            .field("stages", &self.core.stages)
            .field("version", &self.snapshot().version())
            .finish()
    }
}

async fn apply_updates(core: Arc<ServiceCore>, mut updates: mpsc::Receiver<FeedUpdate>) {
    while let Some(update) = updates.recv().await {
        match update {
            FeedUpdate::Membership(event) => core.apply(&event),
            FeedUpdate::Degraded(reason) => {
                tracing::error!(
                    service = %core.name,
                    reason = %reason,
                    "Discovery unavailable, running degraded with an empty instance set"
                );
                core.set_degraded(Some(reason));
            }
            FeedUpdate::Recovered => {
                tracing::info!(service = %core.name, "Discovery recovered, leaving degraded mode");
                core.set_degraded(None);
            }
        }
    }
}

/// Assembles a [`LogicalService`] from its config and collaborators.
pub struct ServiceBuilder {
    config: ServiceConfig,
    discovery: Option<Arc<dyn Discovery>>,
    dialer: Option<Arc<dyn Dialer>>,
    observers: Vec<Arc<dyn CallObserver>>,
    feed_backoff: Backoff,
    event_buffer: usize,
}

impl ServiceBuilder {
    pub fn new(config: ServiceConfig) -> Self {
        let discovery = DiscoveryConfig::default();
        Self {
            config,
            discovery: None,
            dialer: None,
            observers: vec![Arc::new(LogObserver), Arc::new(MetricsObserver)],
            feed_backoff: feed_backoff(&discovery),
            event_buffer: discovery.event_buffer,
        }
    }

    /// Membership source. Defaults to the config's static instance list.
    pub fn discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn discovery_settings(mut self, config: &DiscoveryConfig) -> Self {
        self.feed_backoff = feed_backoff(config);
        self.event_buffer = config.event_buffer;
        self
    }

    /// Transport. Defaults to JSON over HTTP/2.
    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// Add an observer to the default log and metrics observers.
    pub fn observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Drop every observer, including the defaults.
    pub fn without_observers(mut self) -> Self {
        self.observers.clear();
        self
    }

    /// Start the service. Must run inside a Tokio runtime.
    pub fn build(self) -> LogicalService {
        let config = self.config;
        let name = config.name.clone();

        let discovery = self.discovery.unwrap_or_else(|| {
            Arc::new(MemoryRegistry::with_static([(
                name.as_str(),
                config.instances.as_slice(),
            )]))
        });
        let dialer = self.dialer.unwrap_or_else(|| {
            Arc::new(HttpDialer::new(
                name.clone(),
                Duration::from_millis(config.timeouts.connect_ms),
            ))
        });

        let mut stages = Vec::with_capacity(4);
        if !self.observers.is_empty() {
            stages.push(Stage::Observe);
        }
        let limiter = config
            .rate_limit
            .enabled
            .then(|| RateLimiter::from_config(name.clone(), &config.rate_limit));
        if limiter.is_some() {
            stages.push(Stage::Admission);
        }
        let breaker = config
            .circuit_breaker
            .enabled
            .then(|| CircuitBreaker::from_config(name.clone(), &config.circuit_breaker));
        if breaker.is_some() {
            stages.push(Stage::Breaker);
        }
        stages.push(Stage::Retry);

        let instances = Arc::new(InstanceSet::new(name.clone()));
        let membership = {
            let instances = instances.clone();
            Arc::new(move |address: &str| instances.snapshot().contains(address))
        };

        let (version_tx, _) = watch::channel(0);
        let core = Arc::new(ServiceCore {
            name: name.clone(),
            stages,
            instances,
            balancer: config.load_balancer.build(),
            connector: ConnectorFactory::new(name.clone(), dialer).with_membership(membership),
            limiter,
            breaker,
            retry: RetryPolicy::from_config(&config.retries),
            attempt_timeout: Duration::from_millis(config.timeouts.attempt_ms),
            observers: self.observers,
            degraded: Mutex::new(None),
            version_tx,
        });

        let (updates, feed_task) =
            RegistryFeed::new(name.clone(), discovery, self.feed_backoff).spawn(self.event_buffer);
        let updater = tokio::spawn(apply_updates(core.clone(), updates));

        tracing::info!(
            service = %name,
            stages = ?core.stages,
            balancer = ?config.load_balancer,
            "Logical service started"
        );

        LogicalService {
            core,
            _tasks: Arc::new(TaskGuard {
                tasks: vec![feed_task, updater],
            }),
        }
    }
}

fn feed_backoff(config: &DiscoveryConfig) -> Backoff {
    Backoff::exponential(
        Duration::from_millis(config.retry_base_ms),
        Duration::from_millis(config.retry_max_ms),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::observer::testing::RecordingObserver;
    use crate::resilience::backoff::BackoffKind;
    use crate::resilience::rate_limit::AdmissionMode;
    use crate::transport::testing::{Script, ScriptedDialer};
    use serde_json::json;

    const A: &str = "10.0.0.1:80";
    const B: &str = "10.0.0.2:80";

    fn feed_config(instances: &[&str]) -> ServiceConfig {
        let mut config = ServiceConfig::new("feed");
        config.instances = instances.iter().map(|a| a.to_string()).collect();
        config.retries.backoff = BackoffKind::Fixed;
        config.retries.base_delay_ms = 10;
        config
    }

    async fn start(config: ServiceConfig, dialer: Arc<ScriptedDialer>) -> LogicalService {
        let expected = config.instances.len();
        let service = LogicalService::builder(config).dialer(dialer).build();
        service.wait_for(|s| s.len() == expected).await;
        service
    }

    #[tokio::test]
    async fn test_failing_instance_absorbed_by_retry() {
        let dialer = Arc::new(ScriptedDialer::new().script(A, Script::Fail));
        let mut config = feed_config(&[A, B]);
        config.retries.max_attempts = 2;
        let service = start(config, dialer.clone()).await;

        let response = service
            .call(&CallContext::background(), "GetFeeds", json!({"user_id": 1}))
            .await
            .unwrap();
        assert_eq!(response, json!({"user_id": 1}));

        assert_eq!(dialer.invoked(), vec![A.to_string(), B.to_string()]);
        let stats = service.breaker_stats().unwrap();
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.total_successes, 1);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.state, BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_transport() {
        let dialer = Arc::new(ScriptedDialer::new().script(A, Script::Fail));
        let mut config = feed_config(&[A]);
        config.retries.max_attempts = 1;
        config.circuit_breaker.failure_threshold = 2;
        let service = start(config, dialer.clone()).await;
        let ctx = CallContext::background();

        for _ in 0..2 {
            let err = service.call(&ctx, "GetFeeds", json!({})).await.unwrap_err();
            assert!(matches!(err, CallError::Remote { .. }));
        }
        assert_eq!(service.breaker_state(), Some(BreakerState::Open));

        let err = service.call(&ctx, "GetFeeds", json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::CircuitOpen { .. }));
        assert_eq!(dialer.invoked().len(), 2);

        // After the cooldown a single probe reaches the (now healthy) instance.
        dialer.set(A, Script::Succeed);
        service.close();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(service.call(&ctx, "GetFeeds", json!({})).await.is_ok());
        assert_eq!(service.breaker_state(), Some(BreakerState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opening_mid_sequence_stops_retries() {
        let dialer = Arc::new(ScriptedDialer::new().script(A, Script::Fail));
        let mut config = feed_config(&[A]);
        config.retries.max_attempts = 5;
        config.circuit_breaker.failure_threshold = 2;
        let service = start(config, dialer.clone()).await;

        let err = service
            .call(&CallContext::background(), "GetFeeds", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::CircuitOpen { .. }));
        assert_eq!(dialer.invoked().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_call_never_reaches_breaker() {
        let dialer = Arc::new(ScriptedDialer::new());
        let mut config = feed_config(&[A]);
        config.rate_limit.capacity = 1;
        config.rate_limit.refill_per_second = 0.0;
        let service = start(config, dialer.clone()).await;
        let ctx = CallContext::background();

        assert!(service.call(&ctx, "GetFeeds", json!({})).await.is_ok());
        let err = service.call(&ctx, "GetFeeds", json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::RateLimited { .. }));
        assert_eq!(service.breaker_stats().unwrap().total_failures, 0);
        assert_eq!(dialer.invoked().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_admission_times_out() {
        let dialer = Arc::new(ScriptedDialer::new());
        let mut config = feed_config(&[A]);
        config.rate_limit.capacity = 1;
        config.rate_limit.refill_per_second = 1.0;
        config.rate_limit.mode = AdmissionMode::Wait;
        config.rate_limit.max_wait_ms = 50;
        let service = start(config, dialer).await;
        let ctx = CallContext::background();

        assert!(service.call(&ctx, "GetFeeds", json!({})).await.is_ok());
        let err = service.call(&ctx, "GetFeeds", json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::AdmissionTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_set_fails_with_no_instances() {
        let dialer = Arc::new(ScriptedDialer::new());
        let service = start(feed_config(&[]), dialer).await;

        let err = service
            .call(&CallContext::background(), "GetFeeds", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::NoInstances { .. }));
        assert_eq!(service.breaker_stats().unwrap().total_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        let dialer = Arc::new(ScriptedDialer::new().script(A, Script::Hang));
        let mut config = feed_config(&[A, B]);
        config.timeouts.attempt_ms = 100;
        let service = start(config, dialer.clone()).await;

        let response = service
            .call(&CallContext::background(), "GetFeeds", json!({"n": 1}))
            .await
            .unwrap();
        assert_eq!(response, json!({"n": 1}));
        assert_eq!(service.breaker_stats().unwrap().total_failures, 1);
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let dialer = Arc::new(ScriptedDialer::new());
        let service = start(feed_config(&[A]), dialer.clone()).await;

        let ctx = CallContext::background();
        ctx.cancel();
        let err = service.call(&ctx, "GetFeeds", json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::Cancelled));
        assert!(dialer.invoked().is_empty());
    }

    #[tokio::test]
    async fn test_stage_order_and_observer() {
        let recorder = Arc::new(RecordingObserver::default());
        let service = LogicalService::builder(feed_config(&[A]))
            .dialer(Arc::new(ScriptedDialer::new()))
            .without_observers()
            .observer(recorder.clone())
            .build();
        service.wait_for(|s| !s.is_empty()).await;

        assert_eq!(
            service.stages(),
            &[Stage::Observe, Stage::Admission, Stage::Breaker, Stage::Retry]
        );

        service
            .call(&CallContext::background(), "GetFeeds", json!({}))
            .await
            .unwrap();
        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("GetFeeds".to_string(), "success", 1)]);
    }

    #[tokio::test]
    async fn test_optional_stages_can_be_disabled() {
        let mut config = feed_config(&[A]);
        config.rate_limit.enabled = false;
        config.circuit_breaker.enabled = false;
        let service = LogicalService::builder(config)
            .dialer(Arc::new(ScriptedDialer::new()))
            .without_observers()
            .build();

        assert_eq!(service.stages(), &[Stage::Retry]);
        assert_eq!(service.breaker_state(), None);
    }

    #[tokio::test]
    async fn test_retired_instance_connection_released() {
        let registry = MemoryRegistry::new();
        registry.register("feed", A, None);
        registry.register("feed", B, None);
        let dialer = Arc::new(ScriptedDialer::new());
        let service = LogicalService::builder(feed_config(&[]))
            .discovery(Arc::new(registry.clone()))
            .dialer(dialer.clone())
            .build();
        service.wait_for(|s| s.len() == 2).await;

        let ctx = CallContext::background();
        service.call(&ctx, "GetFeeds", json!({})).await.unwrap();
        service.call(&ctx, "GetFeeds", json!({})).await.unwrap();
        assert_eq!(service.connected(), vec![A.to_string(), B.to_string()]);

        registry.deregister("feed", A);
        service.wait_for(|s| !s.contains(A)).await;
        assert_eq!(service.connected(), vec![B.to_string()]);
        assert_eq!(*dialer.closed.lock().unwrap(), vec![A.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_mode_reported_and_cleared() {
        let registry = MemoryRegistry::new();
        registry.set_available(false);
        let service = LogicalService::builder(feed_config(&[]))
            .discovery(Arc::new(registry.clone()))
            .dialer(Arc::new(ScriptedDialer::new()))
            .build();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(service.is_degraded());
        let err = service
            .call(&CallContext::background(), "GetFeeds", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::NoInstances { .. }));

        registry.register("feed", A, None);
        registry.set_available(true);
        service.wait_for(|s| !s.is_empty()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!service.is_degraded());
    }
}
