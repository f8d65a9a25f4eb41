use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::approvals::authority::{ApprovalLimit, AuthorityTable};
use crate::approvals::resolver::ResolverStrategy;
use crate::domain::order::PurchaseOrder;
use crate::domain::role::Role;
use crate::domain::user::User;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PermissionFailure {
    NoApprovalAuthority { role: Role },
    ApprovalLimitExceeded { role: Role, amount: Decimal, limit: Decimal },
    InsufficientRole { role: Role, required_role: Role },
}

impl PermissionFailure {
    fn reason(&self) -> String {
        match self {
            Self::NoApprovalAuthority { role } => {
                format!("role `{role}` has no approval authority")
            }
            Self::ApprovalLimitExceeded { role, amount, limit } => {
                format!("amount {amount} exceeds approval limit of {limit} for role `{role}`")
            }
            Self::InsufficientRole { required_role, .. } => {
                format!("requires {required_role} or higher")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub reason: String,
    pub failure: Option<PermissionFailure>,
}

impl PermissionDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), failure: None }
    }

    fn deny(failure: PermissionFailure) -> Self {
        Self { allowed: false, reason: failure.reason(), failure: Some(failure) }
    }
}

/// Decides whether a user may approve or reject an order right now. Rejecting needs
/// exactly the authority approving would.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PermissionChecker {
    resolver: ResolverStrategy,
}

impl PermissionChecker {
    pub fn new(resolver: ResolverStrategy) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> ResolverStrategy {
        self.resolver
    }

    pub fn required_role(&self, amount: Decimal, authorities: &AuthorityTable) -> Role {
        self.resolver.required_role(amount, authorities)
    }

    pub fn can_act(
        &self,
        user: &User,
        order: &PurchaseOrder,
        authorities: &AuthorityTable,
    ) -> PermissionDecision {
        if user.role == Role::Admin {
            return PermissionDecision::allow("admin may act on any purchase order");
        }

        let limit = match authorities.limit(user.role) {
            ApprovalLimit::NoAuthority => {
                return PermissionDecision::deny(PermissionFailure::NoApprovalAuthority {
                    role: user.role,
                });
            }
            limit => limit,
        };

        if let ApprovalLimit::UpTo(ceiling) = limit {
            if order.total_amount > ceiling {
                return PermissionDecision::deny(PermissionFailure::ApprovalLimitExceeded {
                    role: user.role,
                    amount: order.total_amount,
                    limit: ceiling,
                });
            }
        }

        let required_role = self.required_role(order.total_amount, authorities);
        if !user.role.is_at_least(required_role) {
            return PermissionDecision::deny(PermissionFailure::InsufficientRole {
                role: user.role,
                required_role,
            });
        }

        PermissionDecision::allow(format!(
            "user `{}` ({}) may act on order {} requiring {}",
            user.id, user.role, order.id, required_role
        ))
    }
}
