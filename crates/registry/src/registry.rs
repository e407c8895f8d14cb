//! In-memory service discovery registry (§4.5).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use buckley_events::EventBus;

/// A registered collaborator: another agent, or any process advertising
/// itself to the coordination server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub endpoint: String,
    pub capabilities: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub healthy: bool,
}

/// Filter accepted by `Discover` and `Watch`. `None` fields are wildcards.
#[derive(Debug, Clone, Default)]
pub struct ServiceQuery {
    pub kind: Option<String>,
    pub capabilities: Vec<String>,
    pub tags: HashMap<String, String>,
}

impl ServiceQuery {
    fn matches(&self, service: &ServiceInfo) -> bool {
        if let Some(kind) = &self.kind {
            if &service.kind != kind {
                return false;
            }
        }
        if !self
            .capabilities
            .iter()
            .all(|c| service.capabilities.contains(c))
        {
            return false;
        }
        self.tags
            .iter()
            .all(|(k, v)| service.metadata.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
    Registered(ServiceInfo),
    Updated(ServiceInfo),
    Unregistered(String),
}

impl RegistryEvent {
    fn service(&self) -> Option<&ServiceInfo> {
        match self {
            RegistryEvent::Registered(s) | RegistryEvent::Updated(s) => Some(s),
            RegistryEvent::Unregistered(_) => None,
        }
    }
}

#[derive(Default)]
struct Inner {
    services: HashMap<String, ServiceInfo>,
}

/// The registry itself. Cloning is cheap; clones share state and the
/// watcher fan-out bus.
#[derive(Clone)]
pub struct Registry {
    inner: std::sync::Arc<RwLock<Inner>>,
    bus: EventBus<RegistryEvent>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(RwLock::new(Inner::default())),
            bus: EventBus::new(256),
        }
    }

    /// Insert or replace `service`. Emits `Updated` if `id` already existed,
    /// `Registered` otherwise.
    pub async fn register(&self, service: ServiceInfo) {
        let mut inner = self.inner.write().await;
        let event = if inner.services.contains_key(&service.id) {
            RegistryEvent::Updated(service.clone())
        } else {
            RegistryEvent::Registered(service.clone())
        };
        inner.services.insert(service.id.clone(), service);
        drop(inner);
        self.bus.publish(event);
    }

    /// Idempotent: unregistering an absent id is a no-op and emits nothing.
    pub async fn unregister(&self, id: &str) {
        let mut inner = self.inner.write().await;
        if inner.services.remove(id).is_some() {
            drop(inner);
            self.bus.publish(RegistryEvent::Unregistered(id.to_string()));
        }
    }

    pub async fn discover(&self, query: &ServiceQuery) -> Vec<ServiceInfo> {
        let inner = self.inner.read().await;
        inner
            .services
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<ServiceInfo> {
        self.inner.read().await.services.get(id).cloned()
    }
}

/// A live `Watch` subscription (§4.5). Dropping `cancel` (or cancelling it)
/// stops delivery; the background forwarding task then exits.
pub struct Watch {
    pub events: tokio::sync::mpsc::Receiver<RegistryEvent>,
    pub cancel: buckley_core::CancellationToken,
}

impl Registry {
    /// Returns a channel receiving future events matching `query`. Fan-out
    /// is best-effort: if the channel is full when an event is published,
    /// that event is dropped for this watcher only (§4.5).
    pub fn watch(&self, query: ServiceQuery, queue_size: usize) -> Watch {
        let mut raw = self.bus.raw_subscribe();
        let (tx, rx) = tokio::sync::mpsc::channel(queue_size);
        let cancel = buckley_core::CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    received = raw.recv() => {
                        match received {
                            Ok(event) => {
                                let matches = match event.service() {
                                    Some(service) => query.matches(service),
                                    None => true,
                                };
                                if !matches {
                                    continue;
                                }
                                if tx.try_send(event).is_err() {
                                    tracing::warn!("watcher channel full; dropping registry event for this watcher");
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        Watch { events: rx, cancel }
    }

    pub fn raw_events(&self) -> tokio::sync::broadcast::Receiver<RegistryEvent> {
        self.bus.raw_subscribe()
    }

    pub async fn mark_unhealthy(&self, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        if let Some(service) = inner.services.get_mut(id) {
            service.healthy = false;
            true
        } else {
            false
        }
    }

    pub async fn snapshot(&self) -> Vec<ServiceInfo> {
        self.inner.read().await.services.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(id: &str, kind: &str, capabilities: &[&str]) -> ServiceInfo {
        ServiceInfo {
            id: id.to_string(),
            kind: kind.to_string(),
            endpoint: format!("tcp://{id}"),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            metadata: HashMap::new(),
            healthy: true,
        }
    }

    #[tokio::test]
    async fn register_then_discover_by_type() {
        let registry = Registry::new();
        registry
            .register(service("builder-1", "builder", &["write_files"]))
            .await;
        registry
            .register(service("reviewer-1", "reviewer", &["read_files"]))
            .await;

        let found = registry
            .discover(&ServiceQuery {
                kind: Some("builder".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "builder-1");
    }

    #[tokio::test]
    async fn discover_by_capability() {
        let registry = Registry::new();
        registry
            .register(service("builder-1", "builder", &["write_files"]))
            .await;
        registry
            .register(service("reviewer-1", "reviewer", &["read_files"]))
            .await;

        let found = registry
            .discover(&ServiceQuery {
                capabilities: vec!["write_files".to_string()],
                ..Default::default()
            })
            .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "builder-1");
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = Registry::new();
        registry.register(service("a", "t", &[])).await;
        registry.unregister("a").await;
        registry.unregister("a").await;
        assert!(registry.get("a").await.is_none());
    }

    #[tokio::test]
    async fn re_registering_emits_updated() {
        let registry = Registry::new();
        let mut events = registry.raw_events();
        registry.register(service("a", "t", &[])).await;
        registry.register(service("a", "t2", &[])).await;

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert!(matches!(first, RegistryEvent::Registered(_)));
        assert!(matches!(second, RegistryEvent::Updated(_)));
    }
}
