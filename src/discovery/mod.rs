//! Instance discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Discovery backend (memory.rs registry, file.rs TOML file)
//!     → Discovery::subscribe(service) → initial set + alive/dead stream
//!     → feed.rs (background task per service: reconcile, reconnect)
//!     → FeedUpdate over mpsc
//!     → pipeline::service updater → InstanceSet::apply
//! ```
//!
//! # Design Decisions
//! - Push-based: backends notify, nothing polls on the caller's path
//! - A backend outage keeps the last known set instead of emptying it
//! - Resubscription emits only the difference from the last known set

pub mod feed;
pub mod file;
pub mod memory;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

pub use feed::{FeedUpdate, RegistryFeed};
pub use file::FileRegistry;
pub use memory::{MemoryRegistry, Registration};

/// Change to the membership of one logical service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipEvent {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl MembershipEvent {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Alive,
    Dead,
}

/// One change pushed by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryUpdate {
    pub address: String,
    pub status: InstanceStatus,
}

impl RegistryUpdate {
    pub fn alive(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            status: InstanceStatus::Alive,
        }
    }

    pub fn dead(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            status: InstanceStatus::Dead,
        }
    }
}

/// An established subscription. The stream ending means the backend
/// connection was lost and the subscriber should resubscribe.
#[derive(Debug)]
pub struct Subscription {
    pub initial: Vec<String>,
    pub updates: mpsc::UnboundedReceiver<RegistryUpdate>,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery backend unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse registry file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("registry watch failed: {0}")]
    Watch(#[from] notify::Error),
}

/// A source of live membership for named services.
pub trait Discovery: Send + Sync + 'static {
    fn subscribe<'a>(
        &'a self,
        service: &'a str,
    ) -> BoxFuture<'a, Result<Subscription, DiscoveryError>>;
}
