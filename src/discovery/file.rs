//! File-backed registry.
//!
//! Membership lives in a TOML file:
//!
//! ```toml
//! [services]
//! feed = ["127.0.0.1:7001", "127.0.0.1:7002"]
//! profile = ["127.0.0.1:7101"]
//! ```
//!
//! Each subscription watches the file's directory (editors often replace
//! the file rather than write it in place) and pushes the difference
//! whenever the file changes. An unreadable or invalid file keeps the
//! last known set.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::future::BoxFuture;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::discovery::{Discovery, DiscoveryError, RegistryUpdate, Subscription};

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    services: HashMap<String, Vec<String>>,
}

fn read_members(path: &Path, service: &str) -> Result<BTreeSet<String>, DiscoveryError> {
    let content = std::fs::read_to_string(path)?;
    let mut file: RegistryFile = toml::from_str(&content)?;
    Ok(file
        .services
        .remove(service)
        .unwrap_or_default()
        .into_iter()
        .collect())
}

#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self, service: &str) -> Result<Subscription, DiscoveryError> {
        let initial = read_members(&self.path, service)?;
        let (tx, updates) = mpsc::unbounded_channel();

        let path = self.path.clone();
        let svc = service.to_string();
        let file_name = self.path.file_name().map(|name| name.to_os_string());
        let events_tx = tx.clone();
        let mut known = initial.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify()
                        || event.kind.is_create()
                        || event.kind.is_remove();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref());
                    if !relevant || !ours {
                        return;
                    }

                    match read_members(&path, &svc) {
                        Ok(current) => {
                            for address in current.difference(&known) {
                                let _ = events_tx.send(RegistryUpdate::alive(address.as_str()));
                            }
                            for address in known.difference(&current) {
                                let _ = events_tx.send(RegistryUpdate::dead(address.as_str()));
                            }
                            known = current;
                        }
                        Err(e) => {
                            tracing::warn!(
                                service = %svc,
                                error = %e,
                                "Registry file unreadable, keeping last known set"
                            );
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Registry watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, service = %service, "Registry file watch started");

        // The watcher lives as long as the subscriber holds the receiver.
        tokio::spawn(async move {
            tx.closed().await;
            drop(watcher);
        });

        Ok(Subscription {
            initial: initial.into_iter().collect(),
            updates,
        })
    }
}

impl Discovery for FileRegistry {
    fn subscribe<'a>(
        &'a self,
        service: &'a str,
    ) -> BoxFuture<'a, Result<Subscription, DiscoveryError>> {
        Box::pin(async move { self.open(service) })
    }
}
