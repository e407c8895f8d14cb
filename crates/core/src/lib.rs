//! Shared vocabulary for the coordination core: identifiers, the error
//! model, and the cancellation token threaded through every suspension
//! point (§5).

pub mod error;
pub mod id;

pub use error::{BuckleyError, BuckleyResult};
pub use id::{AgentId, GrantId, HandleId, RandomToken, SessionId};

/// Re-exported so downstream crates depend on one cancellation type rather
/// than picking their own.
pub use tokio_util::sync::CancellationToken;

/// Returns `Err(BuckleyError::Canceled)` if `token` has already fired.
///
/// Call this at the start of each suspension point named in §5 (append,
/// read, snapshot, pending-approval receive, ...) so a cancellation that
/// raced in before any I/O started is observed before committing anything.
pub fn check_canceled(token: &CancellationToken) -> BuckleyResult<()> {
    if token.is_cancelled() {
        Err(BuckleyError::Canceled)
    } else {
        Ok(())
    }
}
