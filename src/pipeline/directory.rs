//! Named collection of logical services.

use std::collections::BTreeMap;

use crate::pipeline::service::{LogicalService, ServiceStatus};

/// Groups logical services by name. Built once at startup and passed to
/// whoever needs to call out; there is no global registry.
#[derive(Debug, Clone, Default)]
pub struct ServiceDirectory {
    services: BTreeMap<String, LogicalService>,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `service`, replacing any service with the same name.
    pub fn insert(&mut self, service: LogicalService) -> Option<LogicalService> {
        self.services.insert(service.name().to_string(), service)
    }

    pub fn get(&self, name: &str) -> Option<&LogicalService> {
        self.services.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.services.values().map(LogicalService::status).collect()
    }

    /// Close every connection of every service.
    pub fn close(&self) {
        for service in self.services.values() {
            service.close();
        }
    }
}

impl FromIterator<LogicalService> for ServiceDirectory {
    fn from_iter<I: IntoIterator<Item = LogicalService>>(iter: I) -> Self {
        let mut directory = Self::new();
        for service in iter {
            directory.insert(service);
        }
        directory
    }
}
