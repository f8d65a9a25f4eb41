use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::role::Role;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `sent` and `completed` are written by downstream collaborators; the approval
/// workflow only ever produces `draft`, `pending` and `approved`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Pending,
    Approved,
    Sent,
    Completed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Sent => "sent",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "sent" => Ok(Self::Sent),
            "completed" => Ok(Self::Completed),
            other => Err(DomainError::UnknownOrderStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub current_approver_role: Option<Role>,
    pub approval_level: i32,
    pub is_approved: bool,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PurchaseOrder {
    /// A freshly created order, as handed over by the order-entry collaborator.
    pub fn draft(
        id: OrderId,
        order_number: impl Into<String>,
        user_id: UserId,
        total_amount: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_number: order_number.into(),
            user_id,
            total_amount,
            status: OrderStatus::Draft,
            current_approver_role: None,
            approval_level: 1,
            is_approved: false,
            approved_by: None,
            approved_at: None,
            created_at,
            updated_at: None,
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self.status, next),
            (OrderStatus::Draft, OrderStatus::Pending)
                | (OrderStatus::Pending, OrderStatus::Approved)
                | (OrderStatus::Pending, OrderStatus::Draft)
                | (OrderStatus::Approved, OrderStatus::Sent)
                | (OrderStatus::Sent, OrderStatus::Completed)
        )
    }

    pub fn ensure_transition(&self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            return Ok(());
        }

        Err(DomainError::InvalidOrderTransition { from: self.status, to: next })
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}
