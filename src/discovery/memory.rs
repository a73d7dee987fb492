//! In-process registry with TTL leases.
//!
//! # Responsibilities
//! - Register/deregister addresses per service, optionally with a TTL
//! - Push alive/dead updates to every open subscription
//! - Expire leases that were not refreshed in time
//! - Simulate outages (`set_available(false)` drops every subscription)
//!
//! Also backs the static instance lists from configuration.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::discovery::{Discovery, DiscoveryError, RegistryUpdate, Subscription};

#[derive(Debug)]
struct RegistryState {
    available: bool,
    /// service → address → lease expiry (`None` never expires)
    services: HashMap<String, BTreeMap<String, Option<Instant>>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<RegistryUpdate>>>,
}

impl RegistryState {
    fn notify(&mut self, service: &str, update: RegistryUpdate) {
        if let Some(subscribers) = self.subscribers.get_mut(service) {
            subscribers.retain(|tx| tx.send(update.clone()).is_ok());
        }
    }
}

/// Shared handle to an in-process registry.
#[derive(Debug, Clone)]
pub struct MemoryRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                available: true,
                services: HashMap::new(),
                subscribers: HashMap::new(),
            })),
        }
    }

    /// Registry pre-populated with permanent entries.
    pub fn with_static<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a [String])>,
    ) -> Self {
        let registry = Self::new();
        for (service, addresses) in entries {
            for address in addresses {
                registry.register(service, address, None);
            }
        }
        registry
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `address` under `service`, or refresh its lease.
    pub fn register(&self, service: &str, address: &str, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut state = self.lock();
        let previous = state
            .services
            .entry(service.to_string())
            .or_default()
            .insert(address.to_string(), expires_at);

        if previous.is_none() {
            tracing::info!(service = %service, address = %address, "Instance registered");
            state.notify(service, RegistryUpdate::alive(address));
        }
    }

    /// Remove `address` from `service`. Returns whether it was registered.
    pub fn deregister(&self, service: &str, address: &str) -> bool {
        let mut state = self.lock();
        let removed = state
            .services
            .get_mut(service)
            .and_then(|members| members.remove(address))
            .is_some();

        if removed {
            tracing::info!(service = %service, address = %address, "Instance deregistered");
            state.notify(service, RegistryUpdate::dead(address));
        }
        removed
    }

    /// Registered addresses of `service`, sorted.
    pub fn addresses(&self, service: &str) -> Vec<String> {
        self.lock()
            .services
            .get(service)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every lease that has run out. Returns how many expired.
    pub fn expire(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();

        let mut expired = Vec::new();
        for (service, members) in state.services.iter_mut() {
            members.retain(|address, expires_at| match expires_at {
                Some(at) if *at <= now => {
                    expired.push((service.clone(), address.clone()));
                    false
                }
                _ => true,
            });
        }

        for (service, address) in &expired {
            tracing::info!(service = %service, address = %address, "Instance lease expired");
            state.notify(service, RegistryUpdate::dead(address.as_str()));
        }
        expired.len()
    }

    /// Run `expire` every `interval` until `shutdown` fires.
    pub fn spawn_reaper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.expire();
                    }
                }
            }
        })
    }

    /// Register with a TTL and keep the lease alive until the returned
    /// guard is dropped.
    pub fn keep_alive(&self, service: &str, address: &str, ttl: Duration) -> Registration {
        self.register(service, address, Some(ttl));

        let registry = self.clone();
        let (svc, addr) = (service.to_string(), address.to_string());
        let refresh = (ttl / 3).max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.register(&svc, &addr, Some(ttl));
            }
        });

        Registration {
            registry: self.clone(),
            service: service.to_string(),
            address: address.to_string(),
            task,
        }
    }

    /// Toggle backend reachability. Going down ends every open
    /// subscription and makes new ones fail.
    pub fn set_available(&self, available: bool) {
        let mut state = self.lock();
        state.available = available;
        if !available {
            state.subscribers.clear();
            tracing::warn!("Memory registry marked unavailable");
        }
    }

    /// Number of open subscriptions for `service`.
    pub fn subscriber_count(&self, service: &str) -> usize {
        self.lock()
            .subscribers
            .get(service)
            .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn open_subscription(&self, service: &str) -> Result<Subscription, DiscoveryError> {
        let mut state = self.lock();
        if !state.available {
            return Err(DiscoveryError::Unavailable("memory registry is down".into()));
        }

        let initial = state
            .services
            .get(service)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default();

        let (tx, updates) = mpsc::unbounded_channel();
        state
            .subscribers
            .entry(service.to_string())
            .or_default()
            .push(tx);

        Ok(Subscription { initial, updates })
    }
}

impl Discovery for MemoryRegistry {
    fn subscribe<'a>(
        &'a self,
        service: &'a str,
    ) -> BoxFuture<'a, Result<Subscription, DiscoveryError>> {
        let subscription = self.open_subscription(service);
        Box::pin(async move { subscription })
    }
}

/// Keep-alive lease. Dropping it deregisters the instance.
#[derive(Debug)]
pub struct Registration {
    registry: MemoryRegistry,
    service: String,
    address: String,
    task: JoinHandle<()>,
}

impl Registration {
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.task.abort();
        self.registry.deregister(&self.service, &self.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::InstanceStatus;

    #[tokio::test]
    async fn test_subscribe_sees_initial_and_updates() {
        let registry = MemoryRegistry::new();
        registry.register("feed", "10.0.0.1:80", None);

        let mut sub = registry.subscribe("feed").await.unwrap();
        assert_eq!(sub.initial, vec!["10.0.0.1:80"]);

        registry.register("feed", "10.0.0.2:80", None);
        registry.register("profile", "10.0.1.1:80", None);
        assert!(registry.deregister("feed", "10.0.0.1:80"));
        assert!(!registry.deregister("feed", "10.0.0.1:80"));

        assert_eq!(sub.updates.recv().await, Some(RegistryUpdate::alive("10.0.0.2:80")));
        assert_eq!(sub.updates.recv().await, Some(RegistryUpdate::dead("10.0.0.1:80")));
        assert!(sub.updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refresh_does_not_renotify() {
        let registry = MemoryRegistry::new();
        let mut sub = registry.subscribe("feed").await.unwrap();

        registry.register("feed", "10.0.0.1:80", Some(Duration::from_secs(5)));
        registry.register("feed", "10.0.0.1:80", Some(Duration::from_secs(5)));

        assert_eq!(sub.updates.recv().await.unwrap().status, InstanceStatus::Alive);
        assert!(sub.updates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let registry = MemoryRegistry::new();
        registry.register("feed", "10.0.0.1:80", Some(Duration::from_secs(2)));
        registry.register("feed", "10.0.0.2:80", None);
        let mut sub = registry.subscribe("feed").await.unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(registry.expire(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(registry.expire(), 1);
        assert_eq!(registry.addresses("feed"), vec!["10.0.0.2:80"]);
        assert_eq!(sub.updates.recv().await, Some(RegistryUpdate::dead("10.0.0.1:80")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_outlives_ttl_and_deregisters_on_drop() {
        let registry = MemoryRegistry::new();
        let shutdown = CancellationToken::new();
        let reaper = registry.spawn_reaper(Duration::from_millis(100), shutdown.clone());

        let lease = registry.keep_alive("feed", "10.0.0.1:80", Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(registry.addresses("feed"), vec![lease.address().to_string()]);

        drop(lease);
        assert!(registry.addresses("feed").is_empty());

        shutdown.cancel();
        reaper.await.unwrap();
    }

    #[tokio::test]
    async fn test_outage_ends_subscriptions() {
        let registry = MemoryRegistry::new();
        let mut sub = registry.subscribe("feed").await.unwrap();
        assert_eq!(registry.subscriber_count("feed"), 1);

        registry.set_available(false);
        assert_eq!(sub.updates.recv().await, None);
        assert!(matches!(
            registry.subscribe("feed").await,
            Err(DiscoveryError::Unavailable(_))
        ));

        registry.set_available(true);
        assert!(registry.subscribe("feed").await.is_ok());
    }
}
