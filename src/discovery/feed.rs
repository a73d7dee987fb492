//! Background membership feed for one logical service.
//!
//! # Responsibilities
//! - Keep a subscription to the discovery backend open
//! - Translate backend updates into `MembershipEvent`s
//! - Resubscribe with backoff after an outage and emit only the difference
//! - Signal degraded mode when no subscription was ever established
//!
//! The task ends when the receiving side is dropped.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::discovery::{Discovery, InstanceStatus, MembershipEvent};
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

/// What the feed tells its owning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    Membership(MembershipEvent),
    /// The first subscription failed; calls run against an empty set.
    Degraded(String),
    /// A subscription succeeded after a degraded start.
    Recovered,
}

pub struct RegistryFeed {
    service: String,
    discovery: Arc<dyn Discovery>,
    backoff: Backoff,
}

impl RegistryFeed {
    pub fn new(
        service: impl Into<String>,
        discovery: Arc<dyn Discovery>,
        backoff: Backoff,
    ) -> Self {
        Self {
            service: service.into(),
            discovery,
            backoff,
        }
    }

    /// Start the feed task.
    pub fn spawn(self, capacity: usize) -> (mpsc::Receiver<FeedUpdate>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tx.closed() => {}
                _ = self.run(&tx) => {}
            }
        });
        (rx, handle)
    }

    async fn run(&self, tx: &mpsc::Sender<FeedUpdate>) {
        let mut known: BTreeSet<String> = BTreeSet::new();
        let mut connected_once = false;
        let mut degraded = false;
        let mut failures: u32 = 0;

        loop {
            match self.discovery.subscribe(&self.service).await {
                Ok(mut subscription) => {
                    if connected_once {
                        metrics::record_resubscribe(&self.service);
                        tracing::info!(
                            service = %self.service,
                            "Discovery subscription re-established"
                        );
                    } else {
                        tracing::info!(
                            service = %self.service,
                            instances = subscription.initial.len(),
                            "Discovery subscription established"
                        );
                    }
                    connected_once = true;
                    failures = 0;

                    let current: BTreeSet<String> = subscription.initial.drain(..).collect();
                    let event = reconcile(&known, &current);
                    known = current;

                    if !event.is_empty() && tx.send(FeedUpdate::Membership(event)).await.is_err() {
                        return;
                    }
                    if degraded {
                        degraded = false;
                        if tx.send(FeedUpdate::Recovered).await.is_err() {
                            return;
                        }
                    }

                    while let Some(update) = subscription.updates.recv().await {
                        let event = match update.status {
                            InstanceStatus::Alive if known.insert(update.address.clone()) => {
                                MembershipEvent {
                                    added: vec![update.address],
                                    removed: Vec::new(),
                                }
                            }
                            InstanceStatus::Dead if known.remove(&update.address) => {
                                MembershipEvent {
                                    added: Vec::new(),
                                    removed: vec![update.address],
                                }
                            }
                            _ => continue,
                        };
                        if tx.send(FeedUpdate::Membership(event)).await.is_err() {
                            return;
                        }
                    }

                    tracing::warn!(
                        service = %self.service,
                        known = known.len(),
                        "Discovery stream lost, keeping last known set"
                    );
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(
                        service = %self.service,
                        error = %e,
                        attempt = failures,
                        "Discovery subscription failed"
                    );
                    if !connected_once && !degraded {
                        degraded = true;
                        if tx.send(FeedUpdate::Degraded(e.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
            }

            tokio::time::sleep(self.backoff.delay(failures.max(1))).await;
        }
    }
}

/// Difference that turns `known` into `current`.
fn reconcile(known: &BTreeSet<String>, current: &BTreeSet<String>) -> MembershipEvent {
    MembershipEvent {
        added: current.difference(known).cloned().collect(),
        removed: known.difference(current).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::MemoryRegistry;
    use std::time::Duration;

    fn feed(registry: &MemoryRegistry) -> RegistryFeed {
        RegistryFeed::new(
            "feed",
            Arc::new(registry.clone()),
            Backoff::fixed(Duration::from_millis(100)),
        )
    }

    fn membership(added: &[&str], removed: &[&str]) -> FeedUpdate {
        FeedUpdate::Membership(MembershipEvent {
            added: added.iter().map(|a| a.to_string()).collect(),
            removed: removed.iter().map(|a| a.to_string()).collect(),
        })
    }

    #[test]
    fn test_reconcile() {
        let known: BTreeSet<String> = ["a:1", "b:1"].iter().map(|s| s.to_string()).collect();
        let current: BTreeSet<String> = ["b:1", "c:1"].iter().map(|s| s.to_string()).collect();
        let event = reconcile(&known, &current);
        assert_eq!(event.added, vec!["c:1"]);
        assert_eq!(event.removed, vec!["a:1"]);
        assert!(reconcile(&current, &current).is_empty());
    }

    #[tokio::test]
    async fn test_initial_set_and_live_updates() {
        let registry = MemoryRegistry::new();
        registry.register("feed", "10.0.0.1:80", None);
        let (mut rx, handle) = feed(&registry).spawn(16);

        assert_eq!(rx.recv().await, Some(membership(&["10.0.0.1:80"], &[])));

        registry.register("feed", "10.0.0.2:80", None);
        assert_eq!(rx.recv().await, Some(membership(&["10.0.0.2:80"], &[])));

        registry.deregister("feed", "10.0.0.1:80");
        assert_eq!(rx.recv().await, Some(membership(&[], &["10.0.0.1:80"])));

        drop(rx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_then_reconcile_difference() {
        let registry = MemoryRegistry::new();
        registry.register("feed", "10.0.0.1:80", None);
        registry.register("feed", "10.0.0.2:80", None);
        let (mut rx, _handle) = feed(&registry).spawn(16);
        assert_eq!(
            rx.recv().await,
            Some(membership(&["10.0.0.1:80", "10.0.0.2:80"], &[]))
        );

        // Changes made while the backend is down are not observed live.
        registry.set_available(false);
        registry.deregister("feed", "10.0.0.1:80");
        registry.register("feed", "10.0.0.3:80", None);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        registry.set_available(true);
        assert_eq!(
            rx.recv().await,
            Some(membership(&["10.0.0.3:80"], &["10.0.0.1:80"]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_reported_once_then_recovered() {
        let registry = MemoryRegistry::new();
        registry.set_available(false);
        let (mut rx, _handle) = feed(&registry).spawn(16);

        assert!(matches!(rx.recv().await, Some(FeedUpdate::Degraded(_))));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());

        registry.register("feed", "10.0.0.1:80", None);
        registry.set_available(true);
        assert_eq!(rx.recv().await, Some(membership(&["10.0.0.1:80"], &[])));
        assert_eq!(rx.recv().await, Some(FeedUpdate::Recovered));
    }
}
