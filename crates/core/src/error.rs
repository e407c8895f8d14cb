//! The error vocabulary shared by every coordination-core component.
//!
//! Each variant corresponds to one of the error kinds in the external
//! interface contract: invalid input, missing resource, resource exhaustion,
//! failed authentication/authorization, a missing collaborator, a
//! storage/encoding failure, or cancellation. Transport layers translate
//! these into status codes; nothing below this module should invent a new
//! kind.

use thiserror::Error;

/// Result type used across the coordination core.
pub type BuckleyResult<T> = Result<T, BuckleyError>;

#[derive(Debug, Error, Clone)]
pub enum BuckleyError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("canceled")]
    Canceled,
}

impl BuckleyError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// A short machine-readable tag, stable across releases, for transports
    /// that want a code distinct from the human-readable message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::PermissionDenied(_) => "permission_denied",
            Self::FailedPrecondition(_) => "failed_precondition",
            Self::Internal(_) => "internal",
            Self::Canceled => "canceled",
        }
    }
}

impl From<tokio::task::JoinError> for BuckleyError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            Self::Canceled
        } else {
            Self::internal(format!("task panicked: {e}"))
        }
    }
}
