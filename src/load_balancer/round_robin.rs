//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{Instance, LoadBalancer, Snapshot};

/// Round-robin selector.
/// The cursor persists across calls and is taken modulo the size of
/// whichever snapshot is passed in, so membership changes never index out
/// of range.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn pick(&self, snapshot: &Snapshot) -> Option<Arc<Instance>> {
        let instances = snapshot.instances();
        if instances.is_empty() {
            return None;
        }

        let position = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(instances[position % instances.len()].clone())
    }
}
