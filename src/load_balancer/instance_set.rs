//! Versioned instance membership for one logical service.
//!
//! # Responsibilities
//! - Publish immutable snapshots readers can hold without locking
//! - Apply membership events copy-on-write and swap atomically
//! - Report which addresses were retired so connections can be released
//!
//! # Design Decisions
//! - `ArcSwap` gives lock-free loads; a reader keeps whichever generation it
//!   loaded for as long as it needs it
//! - Snapshots are ordered by address so rotation order is deterministic
//! - An event that changes nothing does not bump the version

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::discovery::MembershipEvent;
use crate::load_balancer::instance::Instance;

/// An immutable view of membership at one version.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    version: u64,
    instances: Vec<Arc<Instance>>,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Instances ordered by address.
    pub fn instances(&self) -> &[Arc<Instance>] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.address().to_string()).collect()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.instances.iter().any(|i| i.address() == address)
    }
}

/// Result of an `apply` that changed membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub version: u64,
    pub added: Vec<String>,
    pub retired: Vec<String>,
}

/// Thread-safe holder of the current snapshot.
#[derive(Debug)]
pub struct InstanceSet {
    service: String,
    current: ArcSwap<Snapshot>,
}

impl InstanceSet {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            current: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// Current snapshot. Never blocks on a concurrent `apply`.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Apply a membership event. Returns `None` when nothing changed.
    pub fn apply(&self, event: &MembershipEvent) -> Option<Applied> {
        let previous = self
            .current
            .rcu(|current| self.advance(current, event));
        let next = self.current.load_full();

        if Arc::ptr_eq(&previous, &next) {
            return None;
        }

        let before: BTreeSet<&str> = previous.instances.iter().map(|i| i.address()).collect();
        let after: BTreeSet<&str> = next.instances.iter().map(|i| i.address()).collect();

        Some(Applied {
            version: next.version,
            added: after.difference(&before).map(|a| a.to_string()).collect(),
            retired: before.difference(&after).map(|a| a.to_string()).collect(),
        })
    }

    fn advance(&self, current: &Arc<Snapshot>, event: &MembershipEvent) -> Arc<Snapshot> {
        let version = current.version + 1;
        let mut members: BTreeMap<String, Arc<Instance>> = current
            .instances
            .iter()
            .map(|i| (i.address().to_string(), i.clone()))
            .collect();
        let mut changed = false;

        for address in &event.removed {
            changed |= members.remove(address).is_some();
        }

        for address in &event.added {
            if members.contains_key(address) {
                continue;
            }
            match Instance::new(address.clone(), version) {
                Ok(instance) => {
                    members.insert(address.clone(), Arc::new(instance));
                    changed = true;
                }
                Err(e) => {
                    tracing::warn!(service = %self.service, error = %e, "Ignoring instance");
                }
            }
        }

        if !changed {
            return current.clone();
        }

        Arc::new(Snapshot {
            version,
            instances: members.into_values().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(addresses: &[&str]) -> MembershipEvent {
        MembershipEvent {
            added: addresses.iter().map(|a| a.to_string()).collect(),
            removed: Vec::new(),
        }
    }

    fn removed(addresses: &[&str]) -> MembershipEvent {
        MembershipEvent {
            added: Vec::new(),
            removed: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_apply_orders_and_versions() {
        let set = InstanceSet::new("feed");
        assert!(set.snapshot().is_empty());
        assert_eq!(set.snapshot().version(), 0);

        let applied = set.apply(&added(&["10.0.0.2:80", "10.0.0.1:80"])).unwrap();
        assert_eq!(applied.version, 1);
        assert_eq!(applied.added, vec!["10.0.0.1:80", "10.0.0.2:80"]);

        let snapshot = set.snapshot();
        assert_eq!(snapshot.addresses(), vec!["10.0.0.1:80", "10.0.0.2:80"]);
        assert_eq!(snapshot.instances()[0].version(), 1);

        let applied = set.apply(&removed(&["10.0.0.1:80"])).unwrap();
        assert_eq!(applied.retired, vec!["10.0.0.1:80"]);
        assert_eq!(set.snapshot().version(), 2);
    }

    #[test]
    fn test_noop_event_keeps_version() {
        let set = InstanceSet::new("feed");
        set.apply(&added(&["10.0.0.1:80"]));

        assert!(set.apply(&added(&["10.0.0.1:80"])).is_none());
        assert!(set.apply(&removed(&["10.0.0.9:80"])).is_none());
        assert!(set.apply(&added(&["not-an-address"])).is_none());
        assert_eq!(set.snapshot().version(), 1);
    }

    #[test]
    fn test_held_snapshot_is_not_mutated() {
        let set = InstanceSet::new("feed");
        set.apply(&added(&["10.0.0.1:80"]));
        let held = set.snapshot();

        set.apply(&added(&["10.0.0.2:80"]));
        assert_eq!(held.len(), 1);
        assert_eq!(set.snapshot().len(), 2);
    }

    #[test]
    fn test_concurrent_reads_see_whole_generations() {
        // Generation n holds exactly addresses 0..n, so any partial update
        // would show up as a length/version mismatch.
        let set = Arc::new(InstanceSet::new("feed"));
        let writer = {
            let set = set.clone();
            std::thread::spawn(move || {
                for n in 0..200u32 {
                    let address = format!("10.0.{}.{}:7000", n / 250, n % 250);
                    set.apply(&added(&[address.as_str()]));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let set = set.clone();
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let snapshot = set.snapshot();
                        assert_eq!(snapshot.len() as u64, snapshot.version());
                        let mut sorted = snapshot.addresses();
                        sorted.sort();
                        assert_eq!(sorted, snapshot.addresses());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(set.snapshot().len(), 200);
    }
}
