use axum::routing::get;
use axum::Router;

pub mod agents;
pub mod capabilities;
pub mod editor;
pub mod messaging;
pub mod p2p;
pub mod sessions;
pub mod system;
pub mod tasks;
pub mod tools;
pub mod ws;

/// Router for all authenticated endpoints (mounted behind `auth_middleware`).
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/agents", agents::router())
        .nest("/capabilities", capabilities::router())
        .nest("/sessions", sessions::router())
        .nest("/messages", messaging::router())
        .nest("/tasks", tasks::router())
        .nest("/tools/executions", tools::router())
        .nest("/p2p", p2p::router())
        .nest("/editor", editor::router())
        .nest("/observability/stream", ws::router())
}
