//! Server-owned state that is not itself event-sourced: sessions, pending
//! approvals, context handles, and P2P tokens (§3).

pub mod approval;
pub mod edit;
pub mod p2p_token;
pub mod session;
pub mod tool_registry;

pub use approval::{ApprovalResult, PendingApproval, PendingApprovalTable};
pub use edit::{apply_edits, Edit, EditError, Position, Range};
pub use p2p_token::{P2pToken, P2pTokenError, P2pTokenTable};
pub use session::{ContextHandle, ContextHandleTable, Session, SessionContext, SessionTable};
pub use tool_registry::{BuiltinToolRegistry, ToolRegistry};
