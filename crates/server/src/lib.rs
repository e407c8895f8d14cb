//! Buckley coordination server: the HTTP/WebSocket surface agents and
//! editors talk to (§4.2, §4.3, §4.4).

pub mod app;
pub mod config;
pub mod context;
pub mod domain;
pub mod middleware;
pub mod path_resolve;

pub use app::{build_app, AppState};
pub use config::Config;
