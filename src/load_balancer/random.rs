//! Uniform random load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{Instance, LoadBalancer, Snapshot};

/// Picks an instance uniformly at random on every attempt.
#[derive(Debug, Default)]
pub struct RandomPick;

impl RandomPick {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomPick {
    fn pick(&self, snapshot: &Snapshot) -> Option<Arc<Instance>> {
        let instances = snapshot.instances();
        if instances.is_empty() {
            return None;
        }
        Some(instances[fastrand::usize(..instances.len())].clone())
    }
}
