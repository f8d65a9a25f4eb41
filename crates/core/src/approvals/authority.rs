use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalAuthority;
use crate::domain::role::Role;

/// How much a single role may approve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum ApprovalLimit {
    NoAuthority,
    UpTo(Decimal),
    Unbounded,
}

impl ApprovalLimit {
    fn from_ceiling(max_amount: Option<Decimal>) -> Self {
        match max_amount {
            None => Self::Unbounded,
            Some(amount) if amount <= Decimal::ZERO => Self::NoAuthority,
            Some(amount) => Self::UpTo(amount),
        }
    }

    pub fn covers(&self, amount: Decimal) -> bool {
        match self {
            Self::NoAuthority => false,
            Self::UpTo(ceiling) => amount <= *ceiling,
            Self::Unbounded => true,
        }
    }

    /// The ceiling as reported to callers: zero when the role has no authority and
    /// `None` when it is unbounded.
    pub fn max_amount(&self) -> Option<Decimal> {
        match self {
            Self::NoAuthority => Some(Decimal::ZERO),
            Self::UpTo(ceiling) => Some(*ceiling),
            Self::Unbounded => None,
        }
    }
}

impl fmt::Display for ApprovalLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAuthority => f.write_str("0"),
            Self::UpTo(ceiling) => write!(f, "{ceiling}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Snapshot of the active rows of the approval authority table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorityTable {
    limits: HashMap<Role, ApprovalLimit>,
}

impl AuthorityTable {
    pub fn new(authorities: impl IntoIterator<Item = ApprovalAuthority>) -> Self {
        let limits = authorities
            .into_iter()
            .filter(|authority| authority.is_active)
            .map(|authority| (authority.role, ApprovalLimit::from_ceiling(authority.max_amount)))
            .collect();

        Self { limits }
    }

    pub fn limit(&self, role: Role) -> ApprovalLimit {
        self.limits.get(&role).copied().unwrap_or(ApprovalLimit::NoAuthority)
    }

    /// Roles able to approve `amount`, ordered by ascending ceiling and then seniority.
    pub fn roles_covering(&self, amount: Decimal) -> Vec<Role> {
        let mut covering: Vec<(Role, ApprovalLimit)> = self
            .limits
            .iter()
            .filter(|(_, limit)| limit.covers(amount))
            .map(|(role, limit)| (*role, *limit))
            .collect();

        covering.sort_by(|(left_role, left), (right_role, right)| {
            ceiling_sort_key(left)
                .cmp(&ceiling_sort_key(right))
                .then_with(|| left_role.rank().cmp(&right_role.rank()))
        });

        covering.into_iter().map(|(role, _)| role).collect()
    }
}

fn ceiling_sort_key(limit: &ApprovalLimit) -> (u8, Decimal) {
    match limit {
        ApprovalLimit::NoAuthority => (0, Decimal::ZERO),
        ApprovalLimit::UpTo(ceiling) => (1, *ceiling),
        ApprovalLimit::Unbounded => (2, Decimal::ZERO),
    }
}
