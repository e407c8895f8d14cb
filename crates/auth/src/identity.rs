//! Peer identity resolution (§4.4).
//!
//! Mirrors the teacher's `Principal`/claims split: a transport-level fact
//! (what the connection actually proved) is resolved into an opaque agent
//! id, independently of anything the request body claims.

use std::net::IpAddr;

use thiserror::Error;

use buckley_core::AgentId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("no usable peer identity")]
    Unauthenticated,
    #[error("agent-mismatch: body agent_id does not match resolved peer identity")]
    AgentMismatch,
}

/// What the transport actually established about the caller, before any
/// request-body claims are consulted.
#[derive(Debug, Clone)]
pub enum TransportIdentity {
    /// A verified mTLS session; `common_name` came off the peer certificate.
    Mtls { common_name: String },
    /// No client certificate; carries the peer's remote address so the
    /// insecure-local fallback can check for loopback.
    Plaintext { peer_addr: IpAddr },
}

/// Inputs available when the insecure-local fallback applies.
#[derive(Debug, Clone, Default)]
pub struct InsecureLocalHints<'a> {
    pub header_agent_id: Option<&'a str>,
    pub body_agent_id: Option<&'a str>,
}

/// Resolve the effective agent id for a request.
///
/// - mTLS session present: agent id is the certificate's subject CN, full
///   stop — the insecure-local hints are irrelevant.
/// - No mTLS: only if `allow_insecure_local` is set AND the peer address is
///   loopback do we fall back, in order, to the `x-buckley-agent-id`
///   header, then the body's `agent_id`, then the literal `"local"`.
/// - Anything else is `Unauthenticated`.
pub fn resolve_peer_identity(
    transport: &TransportIdentity,
    allow_insecure_local: bool,
    hints: InsecureLocalHints<'_>,
) -> Result<AgentId, IdentityError> {
    match transport {
        TransportIdentity::Mtls { common_name } => Ok(AgentId::new(common_name.clone())),
        TransportIdentity::Plaintext { peer_addr } => {
            if allow_insecure_local && peer_addr.is_loopback() {
                let id = hints
                    .header_agent_id
                    .or(hints.body_agent_id)
                    .unwrap_or("local");
                Ok(AgentId::new(id))
            } else {
                Err(IdentityError::Unauthenticated)
            }
        }
    }
}

/// Enforce §4.4's cross-field consistency rule: a non-empty `agent_id` on
/// the request body must equal the peer-resolved identity, unless the peer
/// holds `admin`.
pub fn check_agent_consistency(
    resolved: &AgentId,
    body_agent_id: Option<&str>,
    peer_capabilities: &[String],
) -> Result<(), IdentityError> {
    let Some(body_id) = body_agent_id.filter(|id| !id.is_empty()) else {
        return Ok(());
    };
    if body_id == resolved.as_str() {
        return Ok(());
    }
    if peer_capabilities.iter().any(|c| c == "admin") {
        return Ok(());
    }
    Err(IdentityError::AgentMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mtls_identity_ignores_hints() {
        let transport = TransportIdentity::Mtls {
            common_name: "agent-7".to_string(),
        };
        let id = resolve_peer_identity(&transport, true, InsecureLocalHints::default()).unwrap();
        assert_eq!(id.as_str(), "agent-7");
    }

    #[test]
    fn plaintext_non_loopback_is_unauthenticated() {
        let transport = TransportIdentity::Plaintext {
            peer_addr: "203.0.113.9".parse().unwrap(),
        };
        let result = resolve_peer_identity(&transport, true, InsecureLocalHints::default());
        assert_eq!(result, Err(IdentityError::Unauthenticated));
    }

    #[test]
    fn loopback_without_insecure_flag_is_unauthenticated() {
        let transport = TransportIdentity::Plaintext {
            peer_addr: "127.0.0.1".parse().unwrap(),
        };
        let result = resolve_peer_identity(&transport, false, InsecureLocalHints::default());
        assert_eq!(result, Err(IdentityError::Unauthenticated));
    }

    #[test]
    fn loopback_prefers_header_over_body_over_literal() {
        let transport = TransportIdentity::Plaintext {
            peer_addr: "127.0.0.1".parse().unwrap(),
        };
        let id = resolve_peer_identity(
            &transport,
            true,
            InsecureLocalHints {
                header_agent_id: Some("from-header"),
                body_agent_id: Some("from-body"),
            },
        )
        .unwrap();
        assert_eq!(id.as_str(), "from-header");

        let id = resolve_peer_identity(
            &transport,
            true,
            InsecureLocalHints {
                header_agent_id: None,
                body_agent_id: Some("from-body"),
            },
        )
        .unwrap();
        assert_eq!(id.as_str(), "from-body");

        let id = resolve_peer_identity(&transport, true, InsecureLocalHints::default()).unwrap();
        assert_eq!(id.as_str(), "local");
    }

    #[test]
    fn mismatched_body_agent_id_is_denied() {
        let resolved = AgentId::new("agent-1");
        let result = check_agent_consistency(&resolved, Some("agent-2"), &[]);
        assert_eq!(result, Err(IdentityError::AgentMismatch));
    }

    #[test]
    fn admin_capability_bypasses_mismatch_check() {
        let resolved = AgentId::new("agent-1");
        let result = check_agent_consistency(&resolved, Some("agent-2"), &["admin".to_string()]);
        assert!(result.is_ok());
    }
}
