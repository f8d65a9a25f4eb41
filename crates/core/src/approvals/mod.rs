//! Multi-tier purchase-order approvals: who must act on an order, whether a given user
//! may, and the transitions that follow.

pub mod authority;
pub mod engine;
pub mod permission;
pub mod resolver;
pub mod stats;
pub mod store;

pub use authority::{ApprovalLimit, AuthorityTable};
pub use engine::{
    ApprovalEngine, ApprovalOutcome, ApprovalPermissions, AuthorityUpdate, EngineSettings,
    RoleAuthority,
};
pub use permission::{PermissionChecker, PermissionDecision, PermissionFailure};
pub use resolver::{
    resolve_required_role, ApprovalBracket, ResolverStrategy, APPROVAL_BRACKETS,
    BASE_APPROVER_ROLE,
};
pub use stats::{ApprovalStats, DEFAULT_URGENT_AFTER_DAYS};
pub use store::{ApprovalStore, InMemoryApprovalStore, OrderPatch, OrderTransition, StoreError};
