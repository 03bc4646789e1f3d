//! Resolves the host this agent reports for, creating it on first start.

use crate::error::{AgentError, Result};
use hostpulse_api::MonitoringApi;
use hostpulse_common::types::{Host, HostSpec};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Fixed-spacing retry for startup calls.
///
/// Client errors are returned immediately; anything else is retried until
/// the attempts run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub spacing: Duration,
}

impl RetryPolicy {
    /// Creating, finding and updating the host.
    pub const DEFAULT: RetryPolicy = RetryPolicy {
        attempts: 20,
        spacing: Duration::from_secs(3),
    };

    /// Looking the host up by custom identifier.
    pub const CUSTOM_IDENTIFIER: RetryPolicy = RetryPolicy {
        attempts: 3,
        spacing: Duration::from_secs(2),
    };

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> hostpulse_api::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = hostpulse_api::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_client_error() || attempt >= self.attempts.max(1) => return Err(e),
                Err(e) => {
                    tracing::warn!(attempt, what, error = %e, "Request failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.spacing).await;
                }
            }
        }
    }
}

/// Persistence of the host id between runs.
pub trait HostIdStore: Send + Sync {
    /// The saved id, or `None` when nothing usable is stored.
    fn load(&self) -> Option<String>;

    fn save(&self, host_id: &str) -> io::Result<()>;

    /// Where the id lives, for log messages.
    fn describe(&self) -> String;
}

/// Stores the host id in a plain text file.
#[derive(Debug, Clone)]
pub struct FileHostIdStore {
    path: PathBuf,
}

impl FileHostIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HostIdStore for FileHostIdStore {
    fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let id = content.trim();
                (!id.is_empty()).then(|| id.to_string())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read host id file");
                None
            }
        }
    }

    fn save(&self, host_id: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, host_id)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub struct Registrar {
    api: Arc<dyn MonitoringApi>,
    store: Box<dyn HostIdStore>,
    retry: RetryPolicy,
    lookup_retry: RetryPolicy,
}

impl Registrar {
    pub fn new(api: Arc<dyn MonitoringApi>, store: Box<dyn HostIdStore>) -> Self {
        Self {
            api,
            store,
            retry: RetryPolicy::DEFAULT,
            lookup_retry: RetryPolicy::CUSTOM_IDENTIFIER,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy, lookup_retry: RetryPolicy) -> Self {
        self.retry = retry;
        self.lookup_retry = lookup_retry;
        self
    }

    /// Loads, looks up or creates the host, applies `on_start` and saves
    /// the id.
    pub async fn prepare_host(&self, spec: &HostSpec, on_start: Option<&str>) -> Result<Host> {
        let api = &self.api;

        let mut host = match self.store.load() {
            Some(host_id) => {
                let id = host_id.as_str();
                self.retry
                    .run("find host", move || api.find_host(id))
                    .await
                    .map_err(|e| {
                        AgentError::Registration(format!(
                            "failed to find this host on the service: {e} (remove {} to register it again)",
                            self.store.describe()
                        ))
                    })?
            }
            None => {
                let host_id = match self.lookup_custom_identifier(spec).await {
                    Some(host) => host.id,
                    None => self
                        .retry
                        .run("create host", move || api.create_host(spec))
                        .await
                        .map_err(|e| {
                            AgentError::Registration(format!("failed to register this host: {e}"))
                        })?,
                };

                let id = host_id.as_str();
                self.retry
                    .run("find host", move || api.find_host(id))
                    .await
                    .map_err(|e| {
                        AgentError::Registration(format!("failed to find the registered host: {e}"))
                    })?
            }
        };

        if let Some(status) = on_start.filter(|status| *status != host.status) {
            let id = host.id.as_str();
            self.retry
                .run("update host status", move || api.update_host_status(id, status))
                .await
                .map_err(|e| {
                    AgentError::Registration(format!("failed to set host status to {status}: {e}"))
                })?;
            host.status = status.to_string();
        }

        self.store.save(&host.id)?;
        tracing::info!(host_id = %host.id, name = %host.name, status = %host.status, "Host resolved");
        Ok(host)
    }

    /// Looks the host up by its custom identifier. Any failure, not found
    /// included, leaves the host unresolved so it gets created instead.
    async fn lookup_custom_identifier(&self, spec: &HostSpec) -> Option<Host> {
        let identifier = spec.custom_identifier.as_deref()?;
        let api = &self.api;
        match self
            .lookup_retry
            .run("find host by custom identifier", move || {
                api.find_host_by_custom_identifier(identifier)
            })
            .await
        {
            Ok(host) => Some(host),
            Err(e) if e.is_not_found() => {
                tracing::debug!(custom_identifier = identifier, "No host registered for custom identifier");
                None
            }
            Err(e) => {
                tracing::warn!(custom_identifier = identifier, error = %e, "Failed to look up host by custom identifier, registering a new one");
                None
            }
        }
    }
}

/// Resolves the hosts that values with a custom identifier are posted for.
///
/// Each identifier is looked up once. Identifiers that cannot be resolved
/// are left out and their values are dropped at ingestion.
pub async fn resolve_custom_identifier_hosts<'a>(
    api: &dyn MonitoringApi,
    identifiers: impl IntoIterator<Item = &'a str>,
) -> HashMap<String, Host> {
    let unique: BTreeSet<&str> = identifiers.into_iter().collect();
    let mut hosts = HashMap::with_capacity(unique.len());
    for identifier in unique {
        match api.find_host_by_custom_identifier(identifier).await {
            Ok(host) => {
                hosts.insert(identifier.to_string(), host);
            }
            Err(e) => {
                tracing::warn!(custom_identifier = identifier, error = %e, "Failed to retrieve host for custom identifier")
            }
        }
    }
    hosts
}
