pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;

pub use approvals::{
    resolve_required_role, ApprovalEngine, ApprovalOutcome, ApprovalPermissions, ApprovalStats,
    ApprovalStore, AuthorityTable, AuthorityUpdate, EngineSettings, InMemoryApprovalStore,
    PermissionChecker, PermissionDecision, ResolverStrategy, RoleAuthority, StoreError,
};
pub use config::AppConfig;
pub use domain::approval::{ApprovalAuthority, ApprovalHistoryEntry, HistoryAction};
pub use domain::order::{OrderId, OrderStatus, PurchaseOrder};
pub use domain::role::Role;
pub use domain::user::{User, UserId};
pub use errors::{ApprovalError, DomainError, InterfaceError};
