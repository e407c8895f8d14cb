//! Configuration options recognized by the core (§6). Loaded from
//! environment variables with `BUCKLEY_` prefixes, mirroring the teacher's
//! convention of small env-driven config rather than a file format.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub address: String,
    pub max_agents: u32,
    pub features: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AcpConfig {
    pub allow_insecure_local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStoreKind {
    Relational,
    Distributed,
}

#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    pub kind: EventStoreKind,
    pub path_or_url: String,
    pub stream_prefix: String,
    pub snapshot_bucket: String,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfigOpts {
    pub max_failures: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct WebSocketConfig {
    pub queue_size: usize,
    pub ping_interval: Duration,
    pub read_deadline: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    /// Per-invocation approval prompts are required.
    Supervised,
    /// Disables per-invocation approval prompts (§6).
    Autonomous,
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub trust_level: TrustLevel,
}

/// Messaging collaborators (§4.2 "routes to orchestrator if configured,
/// else directly to the LLM"). Neither collaborator is a live network
/// client in this workspace; these flags are the real configuration
/// signal for which one a unary `send` should report as the route, and
/// whether the direct path even has a collaborator to fall back to.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Address of the orchestrator to route through. `None` falls back
    /// to the direct-to-model-manager path.
    pub endpoint: Option<String>,
    /// Whether a model-manager collaborator is available for the direct
    /// path when no orchestrator is configured.
    pub model_manager_configured: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub coordinator: CoordinatorConfig,
    pub acp: AcpConfig,
    pub event_store: EventStoreConfig,
    pub tool_approval_timeout: Duration,
    pub breaker: BreakerConfigOpts,
    pub websocket: WebSocketConfig,
    pub policy: PolicyConfig,
    pub orchestrator: OrchestratorConfig,
    pub project_root: std::path::PathBuf,
    pub jwt_secret: Vec<u8>,
    pub p2p_token_secret: Vec<u8>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_secs(key: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default_secs);
    Duration::from_secs(secs)
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// development-friendly defaults for everything.
    pub fn from_env() -> Self {
        let kind = match env_string("EVENT_STORE_KIND", "relational").as_str() {
            "distributed" => EventStoreKind::Distributed,
            _ => EventStoreKind::Relational,
        };

        let trust_level = match env_string("POLICY_TRUST_LEVEL", "supervised").as_str() {
            "autonomous" => TrustLevel::Autonomous,
            _ => TrustLevel::Supervised,
        };

        Self {
            coordinator: CoordinatorConfig {
                address: env_string("COORDINATOR_ADDRESS", "0.0.0.0:8443"),
                max_agents: env_u32("COORDINATOR_MAX_AGENTS", 256),
                features: env_string("COORDINATOR_FEATURES", "")
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
            acp: AcpConfig {
                allow_insecure_local: env_bool("ACP_ALLOW_INSECURE_LOCAL", true),
            },
            event_store: EventStoreConfig {
                kind,
                path_or_url: env_string("EVENT_STORE_PATH_OR_URL", "./data/buckley.sqlite"),
                stream_prefix: env_string("EVENT_STORE_STREAM_PREFIX", "buckley"),
                snapshot_bucket: env_string("EVENT_STORE_SNAPSHOT_BUCKET", "acp_snapshots"),
            },
            tool_approval_timeout: env_secs("TOOL_APPROVAL_TIMEOUT_SECS", 15 * 60),
            breaker: BreakerConfigOpts {
                max_failures: env_u32("BREAKER_MAX_FAILURES", 5),
                timeout: env_secs("BREAKER_TIMEOUT_SECS", 30),
                success_threshold: env_u32("BREAKER_SUCCESS_THRESHOLD", 1),
            },
            websocket: WebSocketConfig {
                queue_size: env_u32("WEBSOCKET_QUEUE_SIZE", 100) as usize,
                ping_interval: env_secs("WEBSOCKET_PING_INTERVAL_SECS", 54),
                read_deadline: env_secs("WEBSOCKET_READ_DEADLINE_SECS", 60),
            },
            policy: PolicyConfig { trust_level },
            orchestrator: OrchestratorConfig {
                endpoint: std::env::var("ORCHESTRATOR_ENDPOINT").ok().filter(|s| !s.is_empty()),
                model_manager_configured: env_bool("MODEL_MANAGER_CONFIGURED", true),
            },
            project_root: std::env::var("PROJECT_ROOT").map(std::path::PathBuf::from).unwrap_or_else(|_| {
                std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."))
            }),
            jwt_secret: env_string("JWT_SECRET", "dev-secret").into_bytes(),
            p2p_token_secret: env_string("P2P_TOKEN_SECRET", "dev-p2p-secret").into_bytes(),
            tls_cert_path: std::env::var("TLS_CERT_PATH").ok(),
            tls_key_path: std::env::var("TLS_KEY_PATH").ok(),
        }
    }

    pub fn supported_auth(&self) -> Vec<&'static str> {
        let mut auth = vec!["mtls"];
        if self.acp.allow_insecure_local {
            auth.push("insecure_local");
        }
        auth
    }
}
