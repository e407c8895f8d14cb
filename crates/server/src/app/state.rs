//! Shared application state, injected into every handler as an `Arc<AppState>`
//! `Extension` (§9 "interface-typed dependency injection": the Event Store,
//! Registry, grant/audit/policy, and reliability primitives are all owned
//! outside the server and handed in at construction).

use std::sync::Arc;

use buckley_auth::{AuditLog, GrantStore, TokenManager, ToolPolicy};
use buckley_events::{EventBus, StoredEvent};
use buckley_registry::Registry;
use buckley_reliability::{BreakerConfig, CircuitBreaker, P2pClient};
use buckley_store::{DistributedEventStore, EventStore, PublishingEventStore, SqliteEventStore};

use crate::config::{Config, EventStoreKind};
use crate::domain::{BuiltinToolRegistry, ContextHandleTable, P2pTokenTable, PendingApprovalTable, SessionTable, ToolRegistry};

pub struct AppState {
    pub config: Config,
    pub event_store: Arc<dyn EventStore>,
    pub event_bus: EventBus<StoredEvent>,
    pub registry: Registry,
    pub grants: GrantStore,
    pub audit: AuditLog,
    pub policy: ToolPolicy,
    pub tokens: Arc<TokenManager>,
    pub sessions: SessionTable,
    pub context_handles: ContextHandleTable,
    pub pending_approvals: PendingApprovalTable,
    pub p2p_tokens: P2pTokenTable,
    pub breaker: CircuitBreaker,
    pub p2p_client: P2pClient,
    pub tool_registry: Arc<dyn ToolRegistry>,
}

impl AppState {
    pub async fn build(config: Config) -> anyhow::Result<Arc<Self>> {
        let event_bus = EventBus::new(1024);

        let event_store: Arc<dyn EventStore> = match config.event_store.kind {
            EventStoreKind::Relational => {
                let backend = SqliteEventStore::open(&config.event_store.path_or_url).await?;
                Arc::new(PublishingEventStore::new(backend, event_bus.clone()))
            }
            EventStoreKind::Distributed => {
                let backend = DistributedEventStore::connect(
                    &config.event_store.path_or_url,
                    &config.event_store.stream_prefix,
                    &config.event_store.snapshot_bucket,
                )
                .await?;
                Arc::new(PublishingEventStore::new(backend, event_bus.clone()))
            }
        };

        let policy = ToolPolicy::new()
            .allow("execute_shell", "shell")
            .allow("write_files", "write_file")
            .allow("read_files", "read_file");

        let breaker = CircuitBreaker::new(BreakerConfig {
            max_failures: config.breaker.max_failures,
            timeout: config.breaker.timeout,
            success_threshold: config.breaker.success_threshold,
        });

        let p2p_client = P2pClient::new(BreakerConfig {
            max_failures: config.breaker.max_failures,
            timeout: config.breaker.timeout,
            success_threshold: config.breaker.success_threshold,
        });

        let tokens = Arc::new(TokenManager::new(config.jwt_secret.clone()));
        let p2p_tokens = P2pTokenTable::new(config.p2p_token_secret.clone());

        Ok(Arc::new(Self {
            config,
            event_store,
            event_bus,
            registry: Registry::new(),
            grants: GrantStore::new(),
            audit: AuditLog::new(),
            policy,
            tokens,
            sessions: SessionTable::new(),
            context_handles: ContextHandleTable::new(),
            pending_approvals: PendingApprovalTable::new(),
            p2p_tokens,
            breaker,
            p2p_client,
            tool_registry: Arc::new(BuiltinToolRegistry::new()),
        }))
    }
}
