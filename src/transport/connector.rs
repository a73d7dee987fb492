//! Per-address connection cache.
//!
//! # Responsibilities
//! - Dial an instance on first use and cache the connection by address
//! - Coalesce concurrent first uses of one address into a single dial
//! - Close and evict connections when discovery retires an instance
//!
//! # Design Decisions
//! - Each address gets its own `OnceCell` slot, so a slow dial only blocks
//!   callers of that address and never spans the remote invocation
//! - A failed dial leaves the slot empty; the next caller dials again
//! - Slots are compared by pointer before eviction so a stale caller never
//!   removes a newer connection
//! - With a membership check installed, no slot outlives its instance: the
//!   check runs after the slot is inserted, and the owner publishes a
//!   retirement before releasing, so one of the two always removes it

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::error::CallError;
use crate::load_balancer::Instance;
use crate::transport::{Connection, Dialer, TransportError};

type Slot = Arc<OnceCell<Arc<dyn Connection>>>;

/// Whether an address is still part of the instance set.
pub type Membership = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Owns every transport connection of one logical service.
pub struct ConnectorFactory {
    service: String,
    dialer: Arc<dyn Dialer>,
    slots: DashMap<String, Slot>,
    membership: Option<Membership>,
}

impl ConnectorFactory {
    pub fn new(service: impl Into<String>, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            service: service.into(),
            dialer,
            slots: DashMap::new(),
            membership: None,
        }
    }

    /// Refuse to dial or cache addresses for which `membership` is false.
    pub fn with_membership(mut self, membership: Membership) -> Self {
        self.membership = Some(membership);
        self
    }

    /// Get a connection to `instance`, dialing it if needed.
    pub async fn get(&self, instance: &Instance) -> Result<Arc<dyn Connection>, CallError> {
        let address = instance.address();

        // One redial is allowed when the cached link turns out to be closed.
        for _ in 0..2 {
            let slot = self.slot(address);
            if !self.is_member(address) {
                // Picked from a snapshot that has since been retired.
                self.evict(address, &slot);
                return Err(retired(address));
            }

            let connection = slot
                .get_or_try_init(|| {
                    tracing::debug!(
                        service = %self.service,
                        address = %address,
                        "Dialing instance"
                    );
                    self.dialer.dial(instance)
                })
                .await
                .map_err(|source| {
                    tracing::warn!(
                        service = %self.service,
                        address = %address,
                        error = %source,
                        "Dial failed"
                    );
                    CallError::Connect {
                        address: address.to_string(),
                        source,
                    }
                })?
                .clone();

            if !self.is_current(address, &slot) {
                // Released while we were dialing.
                connection.close();
                return Err(retired(address));
            }

            if connection.is_closed() {
                tracing::debug!(
                    service = %self.service,
                    address = %address,
                    "Evicting closed connection"
                );
                self.evict(address, &slot);
                continue;
            }

            return Ok(connection);
        }

        Err(CallError::Connect {
            address: address.to_string(),
            source: TransportError::Closed,
        })
    }

    /// Close and forget the connection to `address`, if any.
    pub fn release(&self, address: &str) {
        if let Some((_, slot)) = self.slots.remove(address) {
            if let Some(connection) = slot.get() {
                connection.close();
                tracing::info!(service = %self.service, address = %address, "Released connection");
            }
        }
    }

    /// Release every cached connection.
    pub fn release_all(&self) {
        let addresses: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        for address in addresses {
            self.release(&address);
        }
    }

    /// Addresses with an established connection.
    pub fn connected(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .slots
            .iter()
            .filter(|e| e.value().initialized())
            .map(|e| e.key().clone())
            .collect();
        addresses.sort();
        addresses
    }

    fn slot(&self, address: &str) -> Slot {
        self.slots
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone()
    }

    fn is_member(&self, address: &str) -> bool {
        self.membership
            .as_ref()
            .map_or(true, |membership| membership(address))
    }

    fn is_current(&self, address: &str, slot: &Slot) -> bool {
        self.slots
            .get(address)
            .map(|current| Arc::ptr_eq(current.value(), slot))
            .unwrap_or(false)
    }

    fn evict(&self, address: &str, slot: &Slot) {
        let removed = self
            .slots
            .remove_if(address, |_, current| Arc::ptr_eq(current, slot));
        if let Some((_, stale)) = removed {
            if let Some(connection) = stale.get() {
                connection.close();
            }
        }
    }
}

fn retired(address: &str) -> CallError {
    CallError::Connect {
        address: address.to_string(),
        source: TransportError::Retired,
    }
}

impl std::fmt::Debug for ConnectorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorFactory")
            .field("service", &self.service)
            .field("slots", &self.slots.len())
            .finish()
    }
}
