use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::approval::{ApprovalAuthority, ApprovalHistoryEntry};
use crate::domain::order::{OrderId, OrderStatus, PurchaseOrder};
use crate::domain::role::Role;
use crate::domain::user::{User, UserId};
use crate::errors::ApprovalError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<StoreError> for ApprovalError {
    fn from(value: StoreError) -> Self {
        Self::Internal(value.to_string())
    }
}

/// The approval-related fields of an order, written together by every transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: OrderStatus,
    pub current_approver_role: Option<Role>,
    pub is_approved: bool,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OrderPatch {
    pub fn apply_to(&self, order: &mut PurchaseOrder) {
        order.status = self.status;
        order.current_approver_role = self.current_approver_role;
        order.is_approved = self.is_approved;
        order.approved_by = self.approved_by.clone();
        order.approved_at = self.approved_at;
        order.updated_at = Some(self.updated_at);
    }
}

/// A compare-and-set on `status` plus the history entry it produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderTransition {
    pub order_id: OrderId,
    pub expected_status: OrderStatus,
    pub patch: OrderPatch,
    pub history: ApprovalHistoryEntry,
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<PurchaseOrder>, StoreError>;

    /// Applies the patch only while the order still has `expected_status` and appends the
    /// history entry in the same unit of work. `Ok(None)` means the guard did not match
    /// and nothing was written.
    async fn apply_transition(
        &self,
        transition: OrderTransition,
    ) -> Result<Option<PurchaseOrder>, StoreError>;

    async fn get_pending_orders(&self) -> Result<Vec<PurchaseOrder>, StoreError>;

    async fn get_approved_orders_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PurchaseOrder>, StoreError>;

    async fn get_approval_authorities(&self) -> Result<Vec<ApprovalAuthority>, StoreError>;

    async fn upsert_approval_authority(
        &self,
        authority: ApprovalAuthority,
    ) -> Result<(), StoreError>;

    async fn get_order_history(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ApprovalHistoryEntry>, StoreError>;
}

#[derive(Default)]
struct InMemoryState {
    users: HashMap<String, User>,
    orders: BTreeMap<OrderId, PurchaseOrder>,
    authorities: HashMap<Role, ApprovalAuthority>,
    history: Vec<ApprovalHistoryEntry>,
}

/// Process-local store seeded with the default authority table.
pub struct InMemoryApprovalStore {
    state: RwLock<InMemoryState>,
}

impl Default for InMemoryApprovalStore {
    fn default() -> Self {
        let authorities = ApprovalAuthority::defaults(Utc::now())
            .into_iter()
            .map(|authority| (authority.role, authority))
            .collect();

        Self { state: RwLock::new(InMemoryState { authorities, ..InMemoryState::default() }) }
    }
}

impl InMemoryApprovalStore {
    pub async fn insert_user(&self, user: User) {
        let mut state = self.state.write().await;
        state.users.insert(user.id.0.clone(), user);
    }

    pub async fn insert_order(&self, order: PurchaseOrder) {
        let mut state = self.state.write().await;
        state.orders.insert(order.id, order);
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        Ok(state.users.get(&id.0).cloned())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id).cloned())
    }

    async fn apply_transition(
        &self,
        transition: OrderTransition,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&transition.order_id) else {
            return Ok(None);
        };
        if order.status != transition.expected_status {
            return Ok(None);
        }

        transition.patch.apply_to(order);
        let updated = order.clone();
        state.history.push(transition.history);
        Ok(Some(updated))
    }

    async fn get_pending_orders(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
        let state = self.state.read().await;
        let mut pending: Vec<PurchaseOrder> = state
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(pending)
    }

    async fn get_approved_orders_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PurchaseOrder>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|order| order.is_approved && order.approved_by.as_ref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn get_approval_authorities(&self) -> Result<Vec<ApprovalAuthority>, StoreError> {
        let state = self.state.read().await;
        Ok(state.authorities.values().cloned().collect())
    }

    async fn upsert_approval_authority(
        &self,
        authority: ApprovalAuthority,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.authorities.insert(authority.role, authority);
        Ok(())
    }

    async fn get_order_history(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ApprovalHistoryEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state.history.iter().filter(|entry| entry.order_id == order_id).cloned().collect())
    }
}
