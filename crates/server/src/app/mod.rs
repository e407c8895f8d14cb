//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `state.rs`: infrastructure wiring (event store/bus, registry, policy, reliability)
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Extension, Router};
use buckley_core::CancellationToken;
use buckley_registry::{run_health_check_loop, LivenessCheck};
use tower::ServiceBuilder;

use crate::config::Config;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Build the full HTTP router plus the `AppState` and a `CancellationToken`
/// the caller should cancel on shutdown to stop the background loops this
/// spawns (registry health sweep, bearer-token revocation cleanup).
pub async fn build_app(config: Config) -> anyhow::Result<(Router, Arc<AppState>, CancellationToken)> {
    let app_state = AppState::build(config).await?;

    let auth_state = middleware::AuthState {
        tokens: app_state.tokens.clone(),
        allow_insecure_local: app_state.config.acp.allow_insecure_local,
    };

    let protected = routes::router()
        .layer(Extension(app_state.clone()))
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    let router = Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new());

    let cancel = CancellationToken::new();
    spawn_background_loops(app_state.clone(), cancel.clone());

    Ok((router, app_state, cancel))
}

fn spawn_background_loops(state: Arc<AppState>, cancel: CancellationToken) {
    let registry = state.registry.clone();
    let health_cancel = cancel.clone();
    tokio::spawn(async move {
        let check: LivenessCheck = Arc::new(|service| {
            let healthy = service.healthy;
            Box::pin(async move { healthy })
        });
        run_health_check_loop(registry, check, Duration::from_secs(30), health_cancel).await;
    });

    let tokens = state.tokens.clone();
    let cleanup_cancel = cancel;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = cleanup_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokens
                        .cleanup_revocations(chrono::Utc::now(), buckley_auth::TokenManager::default_revocation_retention())
                        .await;
                }
            }
        }
    });
}
