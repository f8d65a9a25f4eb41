use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderId;
use crate::domain::role::Role;
use crate::domain::user::UserId;

/// Default ceilings per role; `None` means unbounded.
pub const DEFAULT_APPROVAL_CEILINGS: [(Role, Option<i64>); 5] = [
    (Role::FieldWorker, Some(0)),
    (Role::ProjectManager, Some(5_000_000)),
    (Role::HqManagement, Some(30_000_000)),
    (Role::Executive, Some(100_000_000)),
    (Role::Admin, None),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalAuthority {
    pub role: Role,
    pub max_amount: Option<Decimal>,
    pub description: Option<String>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalAuthority {
    pub fn defaults(now: DateTime<Utc>) -> Vec<Self> {
        DEFAULT_APPROVAL_CEILINGS
            .iter()
            .map(|(role, ceiling)| Self {
                role: *role,
                max_amount: ceiling.map(Decimal::from),
                description: None,
                is_active: true,
                updated_at: now,
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Submitted,
    Approved,
    Rejected,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalHistoryEntry {
    pub id: HistoryEntryId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub actor_role: Role,
    pub action: HistoryAction,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}
