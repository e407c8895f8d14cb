//! Service Discovery Registry: in-memory type/capability/tag lookups plus
//! liveness health-checking and watcher fan-out (§4.5).

pub mod health;
pub mod registry;

pub use health::{run_health_check_loop, LivenessCheck};
pub use registry::{Registry, RegistryEvent, ServiceInfo, ServiceQuery, Watch};
