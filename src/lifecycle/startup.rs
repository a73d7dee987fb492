//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the discovery backend selected by the config
//! - Build one LogicalService per configured service
//!
//! # Design Decisions
//! - Fail fast: a backend that cannot be built is a startup error
//! - Services start their discovery feeds immediately; connections are
//!   only opened by the first call

use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::{DiscoveryBackend, GatewayConfig};
use crate::discovery::{Discovery, FileRegistry, MemoryRegistry};
use crate::pipeline::{LogicalService, ServiceDirectory};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("discovery backend 'file' requires discovery.path")]
    MissingRegistryPath,
}

/// Discovery backend shared by every service.
pub fn build_discovery(config: &GatewayConfig) -> Result<Arc<dyn Discovery>, StartupError> {
    match config.discovery.backend {
        DiscoveryBackend::Static => {
            let registry = MemoryRegistry::with_static(
                config
                    .services
                    .iter()
                    .map(|s| (s.name.as_str(), s.instances.as_slice())),
            );
            tracing::info!(services = config.services.len(), "Using static instance lists");
            Ok(Arc::new(registry))
        }
        DiscoveryBackend::File => {
            let path = config
                .discovery
                .path
                .clone()
                .ok_or(StartupError::MissingRegistryPath)?;
            tracing::info!(path = %path.display(), "Using file registry");
            Ok(Arc::new(FileRegistry::new(path)))
        }
    }
}

/// Build and start every configured service. Must run inside a Tokio runtime.
pub fn build_directory(config: &GatewayConfig, discovery: Arc<dyn Discovery>) -> ServiceDirectory {
    config
        .services
        .iter()
        .map(|service| {
            LogicalService::builder(service.clone())
                .discovery(discovery.clone())
                .discovery_settings(&config.discovery)
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[tokio::test]
    async fn test_static_directory() {
        let config = parse_config(
            r#"
            [[services]]
            name = "feed"
            instances = ["127.0.0.1:9001", "127.0.0.1:9002"]

            [[services]]
            name = "topic"
            instances = ["127.0.0.1:9003"]
            "#,
        )
        .unwrap();

        let discovery = build_discovery(&config).unwrap();
        let directory = build_directory(&config, discovery);
        assert_eq!(directory.names(), vec!["feed", "topic"]);

        let feed = directory.get("feed").unwrap();
        feed.wait_for(|s| s.len() == 2).await;
        assert!(feed.snapshot().contains("127.0.0.1:9002"));
    }

    #[test]
    fn test_file_backend_needs_path() {
        let mut config = GatewayConfig::default();
        config.discovery.backend = DiscoveryBackend::File;
        assert!(matches!(
            build_discovery(&config),
            Err(StartupError::MissingRegistryPath)
        ));
    }
}
