//! Identity & Authorization: peer identity, capability grants, tool policy,
//! audit, and bearer tokens (§4.4).

pub mod grants;
pub mod identity;
pub mod policy;
pub mod token;

pub use grants::{CapabilityGrant, GrantError, GrantRequest, GrantStore};
pub use identity::{check_agent_consistency, resolve_peer_identity, IdentityError, InsecureLocalHints, TransportIdentity};
pub use policy::{check_and_audit, AuditEntry, AuditLog, AuditOutcome, ToolPolicy};
pub use token::{BearerClaims, TokenError, TokenManager};
