//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Registry feed event
//!     → instance_set.rs (copy-on-write snapshot, atomic swap)
//!
//! Call attempt:
//!     → instance_set.rs (load current snapshot, lock-free)
//!     → Apply balancing policy:
//!         - round_robin.rs (rotate through instances)
//!         - random.rs (uniform pick)
//!     → instance.rs (address handed to the connector)
//! ```
//!
//! # Design Decisions
//! - Balancers hold only their own cursor; membership lives in the snapshot
//! - Policy selection per logical service
//! - An empty snapshot yields no pick; the caller reports it

pub mod instance;
pub mod instance_set;
pub mod random;
pub mod round_robin;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use instance::{Instance, InvalidAddress};
pub use instance_set::{Applied, InstanceSet, Snapshot};
pub use random::RandomPick;
pub use round_robin::RoundRobin;

/// Instance selection policy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick one instance from `snapshot`, or `None` when it is empty.
    fn pick(&self, snapshot: &Snapshot) -> Option<Arc<Instance>>;
}

/// Configurable balancing policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancerKind {
    #[default]
    RoundRobin,
    Random,
}

impl BalancerKind {
    pub fn build(self) -> Box<dyn LoadBalancer> {
        match self {
            BalancerKind::RoundRobin => Box::new(RoundRobin::new()),
            BalancerKind::Random => Box::new(RandomPick::new()),
        }
    }
}
