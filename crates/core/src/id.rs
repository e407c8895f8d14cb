//! Strongly-typed identifiers shared across the coordination core.
//!
//! `AgentId` is a free-form string (agents pick their own id on register, per
//! §3); everything minted by the server itself uses a format with useful
//! properties for its role: ULIDs for session/grant ids (sortable, good log
//! hygiene), and high-entropy random tokens for things that must not be
//! guessable (execution ids, P2P tokens).

use core::str::FromStr;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::BuckleyError;

/// Identifier of a registered agent. Chosen by the caller at registration
/// time; the registry only requires non-empty and unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for AgentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

macro_rules! impl_ulid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            pub fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            pub fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $t {
            type Err = BuckleyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s)
                    .map(Self)
                    .map_err(|e| BuckleyError::invalid_argument(format!("{}: {}", $name, e)))
            }
        }
    };
}

/// Identifier of a session (ULID, per §3).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Ulid);
impl_ulid_newtype!(SessionId, "SessionId");

/// Identifier of a capability grant (ULID, per §3).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(Ulid);
impl_ulid_newtype!(GrantId, "GrantId");

/// Identifier of a content-addressable context handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(Ulid);
impl_ulid_newtype!(HandleId, "HandleId");

/// Cryptographically random, URL-safe token used for tool-execution ids and
/// P2P brokerage tokens — values that must not be predictable or enumerable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RandomToken(String);

impl RandomToken {
    /// 256 bits of entropy, hex-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RandomToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RandomToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}
