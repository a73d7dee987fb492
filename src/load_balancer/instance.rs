//! A single addressable instance of a logical service.
//!
//! # Responsibilities
//! - Validate the address announced by discovery
//! - Pre-compute the base URL transports build requests from
//! - Remember the snapshot version the instance first appeared in

use thiserror::Error;
use url::Url;

/// Discovery announced an address we cannot dial.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid instance address '{0}': expected host:port")]
pub struct InvalidAddress(pub String);

/// One network-addressable process serving a logical service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    address: String,
    base_url: Url,
    version: u64,
}

impl Instance {
    /// Parse a `host:port` address seen at snapshot `version`.
    pub fn new(address: impl Into<String>, version: u64) -> Result<Self, InvalidAddress> {
        let address = address.into();
        let base_url = Url::parse(&format!("http://{}/", address))
            .map_err(|_| InvalidAddress(address.clone()))?;

        // Url drops default ports, so check the raw address as well.
        let has_port = base_url.port().is_some() || address.ends_with(":80");
        if base_url.host_str().is_none() || !has_port || base_url.path() != "/" {
            return Err(InvalidAddress(address));
        }

        Ok(Self {
            address,
            base_url,
            version,
        })
    }

    /// Identity of the instance.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Snapshot version at which this instance was added.
    pub fn version(&self) -> u64 {
        self.version
    }
}
