//! Periodic liveness sweep over the registry (§4.5 "Health checking").

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use buckley_core::CancellationToken;

use crate::registry::{Registry, ServiceInfo};

/// A pluggable liveness check. Returning `false` causes the service to be
/// unregistered on the next sweep.
pub type LivenessCheck =
    Arc<dyn Fn(&ServiceInfo) -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync>;

/// Runs `check` against every registered service every `interval`, removing
/// any that fail. Stops when `cancel` fires.
pub async fn run_health_check_loop(
    registry: Registry,
    check: LivenessCheck,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for service in registry.snapshot().await {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if !check(&service).await {
                        tracing::warn!(service_id = %service.id, "health check failed, unregistering");
                        registry.unregister(&service.id).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceQuery;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn service(id: &str) -> ServiceInfo {
        ServiceInfo {
            id: id.to_string(),
            kind: "worker".to_string(),
            endpoint: "tcp://x".to_string(),
            capabilities: vec![],
            metadata: HashMap::new(),
            healthy: true,
        }
    }

    #[tokio::test]
    async fn unregisters_services_that_fail_the_check() {
        let registry = Registry::new();
        registry.register(service("a")).await;
        registry.register(service("b")).await;

        let alive = Arc::new(AtomicBool::new(false));
        let alive_clone = alive.clone();
        let check: LivenessCheck = Arc::new(move |service: &ServiceInfo| {
            let alive = alive_clone.clone();
            let is_a = service.id == "a";
            Box::pin(async move { is_a || alive.load(Ordering::SeqCst) })
        });

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let registry_clone = registry.clone();
        let handle = tokio::spawn(async move {
            run_health_check_loop(
                registry_clone,
                check,
                Duration::from_millis(5),
                task_cancel,
            )
            .await;
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();

        let remaining = registry.discover(&ServiceQuery::default()).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "a");
    }
}
