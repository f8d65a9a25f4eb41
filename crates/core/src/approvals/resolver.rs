use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::approvals::authority::AuthorityTable;
use crate::domain::role::Role;

/// Lower bound of an amount bracket and the role that must act on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApprovalBracket {
    pub min_amount: i64,
    pub role: Role,
}

/// Checked top-down; the first bracket whose lower bound is reached wins.
pub const APPROVAL_BRACKETS: [ApprovalBracket; 3] = [
    ApprovalBracket { min_amount: 100_000_000, role: Role::Admin },
    ApprovalBracket { min_amount: 30_000_000, role: Role::Executive },
    ApprovalBracket { min_amount: 5_000_000, role: Role::HqManagement },
];

pub const BASE_APPROVER_ROLE: Role = Role::ProjectManager;

/// Which role must act next on an order of `amount`, using the static brackets.
pub fn resolve_required_role(amount: Decimal) -> Role {
    APPROVAL_BRACKETS
        .iter()
        .find(|bracket| amount >= Decimal::from(bracket.min_amount))
        .map(|bracket| bracket.role)
        .unwrap_or(BASE_APPROVER_ROLE)
}

/// Next-approver policy. One strategy is fixed per engine so that the role recorded
/// on submission and the role demanded by the permission check always agree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverStrategy {
    /// Fixed amount brackets.
    #[default]
    Brackets,
    /// Lowest-ceiling active authority that covers the amount.
    AuthorityLadder,
}

impl ResolverStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Brackets => "brackets",
            Self::AuthorityLadder => "authority_ladder",
        }
    }

    pub fn required_role(self, amount: Decimal, authorities: &AuthorityTable) -> Role {
        match self {
            Self::Brackets => resolve_required_role(amount),
            Self::AuthorityLadder => authorities
                .roles_covering(amount)
                .into_iter()
                .next()
                .unwrap_or(Role::Admin),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{resolve_required_role, ResolverStrategy};
    use crate::approvals::authority::AuthorityTable;
    use crate::domain::approval::ApprovalAuthority;
    use crate::domain::role::Role;

    fn amount(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    #[test]
    fn small_orders_go_to_project_manager() {
        assert_eq!(resolve_required_role(Decimal::ZERO), Role::ProjectManager);
        assert_eq!(resolve_required_role(amount(2_000_000)), Role::ProjectManager);
        assert_eq!(resolve_required_role(amount(4_999_999)), Role::ProjectManager);
    }

    #[test]
    fn bracket_edges_resolve_to_the_higher_role() {
        assert_eq!(resolve_required_role(amount(5_000_000)), Role::HqManagement);
        assert_eq!(resolve_required_role(amount(30_000_000)), Role::Executive);
        assert_eq!(resolve_required_role(amount(100_000_000)), Role::Admin);
    }

    #[test]
    fn fractional_amounts_just_below_an_edge_stay_in_the_lower_bracket() {
        assert_eq!(resolve_required_role(Decimal::new(2_999_999_999, 2)), Role::HqManagement);
        assert_eq!(resolve_required_role(amount(50_000_000)), Role::Executive);
    }

    #[test]
    fn ladder_walks_active_authorities_by_ascending_ceiling() {
        let table = AuthorityTable::new(ApprovalAuthority::defaults(Utc::now()));
        let ladder = ResolverStrategy::AuthorityLadder;

        assert_eq!(ladder.required_role(amount(2_000_000), &table), Role::ProjectManager);
        // Ceilings are inclusive, so the ladder keeps the edge amount with the lower role.
        assert_eq!(ladder.required_role(amount(5_000_000), &table), Role::ProjectManager);
        assert_eq!(ladder.required_role(amount(5_000_001), &table), Role::HqManagement);
        assert_eq!(ladder.required_role(amount(150_000_000), &table), Role::Admin);
    }

    #[test]
    fn ladder_falls_back_to_admin_when_nothing_covers_the_amount() {
        let mut authorities = ApprovalAuthority::defaults(Utc::now());
        authorities.retain(|authority| authority.role != Role::Admin);
        let table = AuthorityTable::new(authorities);

        assert_eq!(
            ResolverStrategy::AuthorityLadder.required_role(amount(500_000_000), &table),
            Role::Admin
        );
    }

    #[test]
    fn brackets_ignore_the_authority_table() {
        let table = AuthorityTable::default();
        assert_eq!(
            ResolverStrategy::Brackets.required_role(amount(5_000_000), &table),
            Role::HqManagement
        );
    }
}
