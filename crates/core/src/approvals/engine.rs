use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::approvals::authority::{ApprovalLimit, AuthorityTable};
use crate::approvals::permission::{PermissionChecker, PermissionDecision};
use crate::approvals::resolver::ResolverStrategy;
use crate::approvals::stats::{self, ApprovalStats, DEFAULT_URGENT_AFTER_DAYS};
use crate::approvals::store::{ApprovalStore, OrderPatch, OrderTransition};
use crate::domain::approval::{
    ApprovalAuthority, ApprovalHistoryEntry, HistoryAction, HistoryEntryId,
};
use crate::domain::order::{OrderId, OrderStatus, PurchaseOrder};
use crate::domain::role::Role;
use crate::domain::user::{User, UserId};
use crate::errors::ApprovalError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub resolver: ResolverStrategy,
    pub urgent_after_days: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { resolver: ResolverStrategy::Brackets, urgent_after_days: DEFAULT_URGENT_AFTER_DAYS }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub message: String,
    pub order: PurchaseOrder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalPermissions {
    pub can_approve: bool,
    /// `None` when the role's authority is unbounded.
    pub max_amount: Option<Decimal>,
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityUpdate {
    pub role: Role,
    pub max_amount: Option<Decimal>,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAuthority {
    pub role: Role,
    pub has_authority: bool,
    /// `None` when the role's authority is unbounded.
    pub max_amount: Option<Decimal>,
    pub description: Option<String>,
}

/// Drives purchase orders through `draft -> pending -> approved`, with `reject`
/// returning a pending order to `draft`.
pub struct ApprovalEngine<S> {
    store: S,
    checker: PermissionChecker,
    urgent_after_days: i64,
}

impl<S> ApprovalEngine<S>
where
    S: ApprovalStore,
{
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Self {
            store,
            checker: PermissionChecker::new(settings.resolver),
            urgent_after_days: settings.urgent_after_days,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> ResolverStrategy {
        self.checker.resolver()
    }

    pub async fn submit_for_approval(
        &self,
        order_id: OrderId,
        user_id: &UserId,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let user = self.load_user(user_id).await?;
        let order = self.load_order(order_id).await?;

        if order.status != OrderStatus::Draft {
            return Err(ApprovalError::InvalidState(format!(
                "only draft orders can be submitted for approval; order {order_id} is {}",
                order.status
            )));
        }
        order.ensure_transition(OrderStatus::Pending)?;

        let authorities = self.authority_table().await?;
        let required_role = self.checker.required_role(order.total_amount, &authorities);
        let now = Utc::now();

        let updated = self
            .commit(OrderTransition {
                order_id,
                expected_status: OrderStatus::Draft,
                patch: OrderPatch {
                    status: OrderStatus::Pending,
                    current_approver_role: Some(required_role),
                    is_approved: false,
                    approved_by: None,
                    approved_at: None,
                    updated_at: now,
                },
                history: history_entry(
                    order_id,
                    &user,
                    HistoryAction::Submitted,
                    "submitted for approval".to_string(),
                    now,
                ),
            })
            .await?;

        info!(
            event_name = "approvals.order.submitted",
            order_id = %order_id,
            user_id = %user.id,
            required_role = %required_role,
            resolver = self.resolver().as_str(),
            "purchase order submitted for approval"
        );

        Ok(ApprovalOutcome {
            message: format!("purchase order {order_id} submitted for approval"),
            order: updated,
        })
    }

    pub async fn approve_order(
        &self,
        order_id: OrderId,
        user_id: &UserId,
        note: Option<String>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let (user, order) = self.authorize_decision(order_id, user_id, "approved").await?;
        order.ensure_transition(OrderStatus::Approved)?;
        let now = Utc::now();

        let updated = self
            .commit(OrderTransition {
                order_id,
                expected_status: OrderStatus::Pending,
                patch: OrderPatch {
                    status: OrderStatus::Approved,
                    current_approver_role: None,
                    is_approved: true,
                    approved_by: Some(user.id.clone()),
                    approved_at: Some(now),
                    updated_at: now,
                },
                history: history_entry(
                    order_id,
                    &user,
                    HistoryAction::Approved,
                    note_or(note, "approved"),
                    now,
                ),
            })
            .await?;

        info!(
            event_name = "approvals.order.approved",
            order_id = %order_id,
            user_id = %user.id,
            role = %user.role,
            "purchase order approved"
        );

        Ok(ApprovalOutcome {
            message: format!("purchase order {order_id} approved"),
            order: updated,
        })
    }

    pub async fn reject_order(
        &self,
        order_id: OrderId,
        user_id: &UserId,
        note: Option<String>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let (user, order) = self.authorize_decision(order_id, user_id, "rejected").await?;
        order.ensure_transition(OrderStatus::Draft)?;
        let now = Utc::now();

        let updated = self
            .commit(OrderTransition {
                order_id,
                expected_status: OrderStatus::Pending,
                patch: OrderPatch {
                    status: OrderStatus::Draft,
                    current_approver_role: None,
                    is_approved: false,
                    approved_by: None,
                    approved_at: None,
                    updated_at: now,
                },
                history: history_entry(
                    order_id,
                    &user,
                    HistoryAction::Rejected,
                    note_or(note, "rejected"),
                    now,
                ),
            })
            .await?;

        info!(
            event_name = "approvals.order.rejected",
            order_id = %order_id,
            user_id = %user.id,
            role = %user.role,
            "purchase order returned to draft"
        );

        Ok(ApprovalOutcome {
            message: format!("purchase order {order_id} rejected and returned to draft"),
            order: updated,
        })
    }

    pub async fn user_approval_permissions(
        &self,
        user_id: &UserId,
    ) -> Result<ApprovalPermissions, ApprovalError> {
        let user = self.load_user(user_id).await?;
        if user.role == Role::Admin {
            return Ok(ApprovalPermissions { can_approve: true, max_amount: None, role: user.role });
        }

        let max_amount = self.authority_table().await?.limit(user.role).max_amount();
        let can_approve = max_amount.map_or(true, |amount| amount > Decimal::ZERO);

        Ok(ApprovalPermissions { can_approve, max_amount, role: user.role })
    }

    /// Permission verdict for one user and one order, without changing anything.
    pub async fn check_permission(
        &self,
        order_id: OrderId,
        user_id: &UserId,
    ) -> Result<PermissionDecision, ApprovalError> {
        let user = self.load_user(user_id).await?;
        let order = self.load_order(order_id).await?;
        let authorities = self.authority_table().await?;
        Ok(self.checker.can_act(&user, &order, &authorities))
    }

    pub async fn stats(&self, user_id: &UserId) -> Result<ApprovalStats, ApprovalError> {
        self.stats_at(user_id, Utc::now()).await
    }

    pub async fn stats_at(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ApprovalStats, ApprovalError> {
        let user = self.load_user(user_id).await?;
        let orders = self.orders_in_scope(&user).await?;
        Ok(stats::summarize(&orders, now, self.urgent_after_days))
    }

    pub async fn pending_approvals(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PurchaseOrder>, ApprovalError> {
        let user = self.load_user(user_id).await?;
        self.orders_in_scope(&user).await
    }

    /// Orders the user approved, most recently touched first.
    pub async fn approval_history(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PurchaseOrder>, ApprovalError> {
        let user = self.load_user(user_id).await?;
        let mut orders = self.store.get_approved_orders_by_user(&user.id).await?;
        orders.sort_by(|left, right| {
            right
                .last_activity_at()
                .cmp(&left.last_activity_at())
                .then_with(|| right.id.cmp(&left.id))
        });
        Ok(orders)
    }

    /// Decision trail of one order, oldest first.
    pub async fn order_trail(
        &self,
        order_id: OrderId,
        user_id: &UserId,
    ) -> Result<Vec<ApprovalHistoryEntry>, ApprovalError> {
        self.load_user(user_id).await?;
        self.load_order(order_id).await?;
        let mut entries = self.store.get_order_history(order_id).await?;
        entries.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(entries)
    }

    /// Every authority row, highest ceiling first with unbounded roles on top. Admin only.
    pub async fn list_authorities(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ApprovalAuthority>, ApprovalError> {
        self.require_admin(user_id, "list").await?;
        let mut authorities = self.store.get_approval_authorities().await?;
        authorities.sort_by(|left, right| match (left.max_amount, right.max_amount) {
            (None, None) => right.role.rank().cmp(&left.role.rank()),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(left_amount), Some(right_amount)) => right_amount
                .cmp(&left_amount)
                .then_with(|| right.role.rank().cmp(&left.role.rank())),
        });
        Ok(authorities)
    }

    /// Effective authority of `role`, as the permission checker sees it.
    pub async fn role_authority(
        &self,
        user_id: &UserId,
        role: Role,
    ) -> Result<RoleAuthority, ApprovalError> {
        let user = self.load_user(user_id).await?;
        if !user.role.is_at_least(Role::ProjectManager) {
            return Err(ApprovalError::PermissionDenied(format!(
                "role `{}` may not inspect approval authorities",
                user.role
            )));
        }

        let rows = self.store.get_approval_authorities().await?;
        let description = rows
            .iter()
            .find(|authority| authority.role == role && authority.is_active)
            .and_then(|authority| authority.description.clone());
        let limit = AuthorityTable::new(rows).limit(role);

        Ok(RoleAuthority {
            role,
            has_authority: limit != ApprovalLimit::NoAuthority,
            max_amount: limit.max_amount(),
            description,
        })
    }

    pub async fn update_authority(
        &self,
        actor_id: &UserId,
        update: AuthorityUpdate,
    ) -> Result<ApprovalAuthority, ApprovalError> {
        let actor = self.require_admin(actor_id, "edit").await?;

        if update.max_amount.is_some_and(|amount| amount < Decimal::ZERO) {
            return Err(ApprovalError::InvalidInput(format!(
                "max amount for `{}` must not be negative",
                update.role
            )));
        }

        let authority = ApprovalAuthority {
            role: update.role,
            max_amount: update.max_amount,
            description: update.description,
            is_active: update.is_active,
            updated_at: Utc::now(),
        };
        self.store.upsert_approval_authority(authority.clone()).await?;

        info!(
            event_name = "approvals.authority.updated",
            user_id = %actor.id,
            role = %authority.role,
            is_active = authority.is_active,
            "approval authority updated"
        );

        Ok(authority)
    }

    async fn require_admin(&self, user_id: &UserId, verb: &str) -> Result<User, ApprovalError> {
        let user = self.load_user(user_id).await?;
        if user.role != Role::Admin {
            warn!(
                event_name = "approvals.authority.access_denied",
                user_id = %user.id,
                role = %user.role,
                verb,
                "non-admin attempted to access approval authorities"
            );
            return Err(ApprovalError::PermissionDenied(format!(
                "only admin may {verb} approval authorities"
            )));
        }
        Ok(user)
    }

    async fn authorize_decision(
        &self,
        order_id: OrderId,
        user_id: &UserId,
        decision: &str,
    ) -> Result<(User, PurchaseOrder), ApprovalError> {
        let user = self.load_user(user_id).await?;
        let order = self.load_order(order_id).await?;

        if order.status != OrderStatus::Pending {
            return Err(ApprovalError::InvalidState(format!(
                "only pending orders can be {decision}; order {order_id} is {}",
                order.status
            )));
        }

        let authorities = self.authority_table().await?;
        let verdict = self.checker.can_act(&user, &order, &authorities);
        if !verdict.allowed {
            warn!(
                event_name = "approvals.permission.denied",
                order_id = %order_id,
                user_id = %user.id,
                role = %user.role,
                reason = %verdict.reason,
                "approval decision denied"
            );
            return Err(ApprovalError::PermissionDenied(verdict.reason));
        }

        Ok((user, order))
    }

    async fn orders_in_scope(&self, user: &User) -> Result<Vec<PurchaseOrder>, ApprovalError> {
        let pending = self.store.get_pending_orders().await?;
        if user.role == Role::Admin {
            return Ok(pending);
        }

        let authorities = self.authority_table().await?;
        Ok(pending
            .into_iter()
            .filter(|order| self.checker.can_act(user, order, &authorities).allowed)
            .collect())
    }

    async fn commit(&self, transition: OrderTransition) -> Result<PurchaseOrder, ApprovalError> {
        let order_id = transition.order_id;
        let expected = transition.expected_status;

        match self.store.apply_transition(transition).await {
            Ok(Some(order)) => Ok(order),
            Ok(None) => {
                warn!(
                    event_name = "approvals.transition.conflict",
                    order_id = %order_id,
                    expected_status = %expected,
                    "purchase order changed before the transition could be applied"
                );
                Err(ApprovalError::Conflict { order_id, expected })
            }
            Err(store_error) => {
                error!(
                    event_name = "approvals.transition.failed",
                    order_id = %order_id,
                    error = %store_error,
                    "failed to persist approval transition"
                );
                Err(store_error.into())
            }
        }
    }

    async fn authority_table(&self) -> Result<AuthorityTable, ApprovalError> {
        Ok(AuthorityTable::new(self.store.get_approval_authorities().await?))
    }

    async fn load_user(&self, user_id: &UserId) -> Result<User, ApprovalError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| ApprovalError::UserNotFound(user_id.0.clone()))
    }

    async fn load_order(&self, order_id: OrderId) -> Result<PurchaseOrder, ApprovalError> {
        self.store.get_order(order_id).await?.ok_or(ApprovalError::OrderNotFound(order_id))
    }
}

fn history_entry(
    order_id: OrderId,
    user: &User,
    action: HistoryAction,
    notes: String,
    now: DateTime<Utc>,
) -> ApprovalHistoryEntry {
    ApprovalHistoryEntry {
        id: HistoryEntryId(Uuid::new_v4().to_string()),
        order_id,
        user_id: user.id.clone(),
        actor_role: user.role,
        action,
        notes,
        created_at: now,
    }
}

fn note_or(note: Option<String>, default: &str) -> String {
    note.map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use super::{ApprovalEngine, AuthorityUpdate, EngineSettings};
    use crate::approvals::resolver::{resolve_required_role, ResolverStrategy};
    use crate::approvals::store::{ApprovalStore, InMemoryApprovalStore};
    use crate::domain::approval::HistoryAction;
    use crate::domain::order::{OrderId, OrderStatus, PurchaseOrder};
    use crate::domain::role::Role;
    use crate::domain::user::{User, UserId};
    use crate::errors::ApprovalError;

    async fn engine_with(settings: EngineSettings) -> ApprovalEngine<InMemoryApprovalStore> {
        let store = InMemoryApprovalStore::default();
        for role in Role::ALL {
            store.insert_user(User::new(format!("u-{role}"), format!("{role} user"), role)).await;
        }
        ApprovalEngine::new(store, settings)
    }

    async fn engine() -> ApprovalEngine<InMemoryApprovalStore> {
        engine_with(EngineSettings::default()).await
    }

    fn uid(role: Role) -> UserId {
        UserId(format!("u-{role}"))
    }

    async fn add_draft(engine: &ApprovalEngine<InMemoryApprovalStore>, id: i64, amount: i64) {
        engine
            .store()
            .insert_order(PurchaseOrder::draft(
                OrderId(id),
                format!("PO-{id}"),
                uid(Role::FieldWorker),
                Decimal::new(amount, 0),
                Utc::now(),
            ))
            .await;
    }

    async fn add_pending(
        engine: &ApprovalEngine<InMemoryApprovalStore>,
        id: i64,
        amount: i64,
        created_at: DateTime<Utc>,
    ) {
        let amount = Decimal::new(amount, 0);
        let mut order = PurchaseOrder::draft(
            OrderId(id),
            format!("PO-{id}"),
            uid(Role::FieldWorker),
            amount,
            created_at,
        );
        order.status = OrderStatus::Pending;
        order.current_approver_role = Some(resolve_required_role(amount));
        engine.store().insert_order(order).await;
    }

    #[tokio::test]
    async fn scenario_small_order_is_approved_by_project_manager() {
        let engine = engine().await;
        add_draft(&engine, 1, 2_000_000).await;

        let submitted = engine
            .submit_for_approval(OrderId(1), &uid(Role::FieldWorker))
            .await
            .expect("submit");
        assert_eq!(submitted.order.status, OrderStatus::Pending);
        assert_eq!(submitted.order.current_approver_role, Some(Role::ProjectManager));

        let approved = engine
            .approve_order(OrderId(1), &uid(Role::ProjectManager), None)
            .await
            .expect("approve");
        assert_eq!(approved.order.status, OrderStatus::Approved);
        assert!(approved.order.is_approved);
        assert_eq!(approved.order.approved_by, Some(uid(Role::ProjectManager)));
        assert!(approved.order.approved_at.is_some());
        assert!(approved.order.current_approver_role.is_none());
    }

    #[tokio::test]
    async fn scenario_project_manager_cannot_approve_executive_order() {
        let engine = engine().await;
        add_draft(&engine, 2, 50_000_000).await;

        let submitted = engine
            .submit_for_approval(OrderId(2), &uid(Role::FieldWorker))
            .await
            .expect("submit");
        assert_eq!(submitted.order.current_approver_role, Some(Role::Executive));

        let error = engine
            .approve_order(OrderId(2), &uid(Role::ProjectManager), None)
            .await
            .expect_err("project manager should be denied");
        assert!(matches!(error, ApprovalError::PermissionDenied(_)));

        // Lift the ceiling so the seniority check is what denies the project manager.
        engine
            .update_authority(
                &uid(Role::Admin),
                AuthorityUpdate {
                    role: Role::ProjectManager,
                    max_amount: Some(Decimal::new(60_000_000, 0)),
                    description: None,
                    is_active: true,
                },
            )
            .await
            .expect("update authority");
        let error = engine
            .approve_order(OrderId(2), &uid(Role::ProjectManager), None)
            .await
            .expect_err("still below executive");
        assert_eq!(error, ApprovalError::PermissionDenied("requires executive or higher".into()));

        let order = engine.store().get_order(OrderId(2)).await.expect("load").expect("exists");
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn scenario_field_worker_permissions() {
        let engine = engine().await;
        let permissions =
            engine.user_approval_permissions(&uid(Role::FieldWorker)).await.expect("permissions");

        assert!(!permissions.can_approve);
        assert_eq!(permissions.max_amount, Some(Decimal::ZERO));
        assert_eq!(permissions.role, Role::FieldWorker);

        let json = serde_json::to_value(&permissions).expect("serialize");
        assert_eq!(json["canApprove"], false);
        assert_eq!(json["role"], "field_worker");
    }

    #[tokio::test]
    async fn admin_permissions_are_unbounded() {
        let engine = engine().await;
        let permissions =
            engine.user_approval_permissions(&uid(Role::Admin)).await.expect("permissions");
        assert!(permissions.can_approve);
        assert_eq!(permissions.max_amount, None);

        let manager = engine
            .user_approval_permissions(&uid(Role::ProjectManager))
            .await
            .expect("permissions");
        assert!(manager.can_approve);
        assert_eq!(manager.max_amount, Some(Decimal::new(5_000_000, 0)));
    }

    #[tokio::test]
    async fn submit_then_reject_returns_order_to_draft() {
        let engine = engine().await;
        add_draft(&engine, 3, 5_000_000).await;

        let submitted = engine
            .submit_for_approval(OrderId(3), &uid(Role::FieldWorker))
            .await
            .expect("submit");
        assert_eq!(submitted.order.current_approver_role, Some(Role::HqManagement));

        let rejected = engine
            .reject_order(OrderId(3), &uid(Role::HqManagement), Some("wrong vendor".into()))
            .await
            .expect("reject");
        assert_eq!(rejected.order.status, OrderStatus::Draft);
        assert!(rejected.order.current_approver_role.is_none());
        assert!(!rejected.order.is_approved);
        assert!(rejected.order.approved_by.is_none());

        let trail = engine.order_trail(OrderId(3), &uid(Role::Admin)).await.expect("trail");
        let actions: Vec<HistoryAction> = trail.iter().map(|entry| entry.action).collect();
        assert_eq!(actions, vec![HistoryAction::Submitted, HistoryAction::Rejected]);
        assert_eq!(trail[1].notes, "wrong vendor");
        assert_eq!(trail[1].actor_role, Role::HqManagement);

        let resubmitted = engine
            .submit_for_approval(OrderId(3), &uid(Role::FieldWorker))
            .await
            .expect("rejected orders can be resubmitted");
        assert_eq!(resubmitted.order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn rejection_needs_the_same_authority_as_approval() {
        let engine = engine().await;
        let now = Utc::now();
        add_pending(&engine, 4, 40_000_000, now - Duration::hours(1)).await;

        let error = engine
            .reject_order(OrderId(4), &uid(Role::HqManagement), None)
            .await
            .expect_err("hq cannot reject executive-level order");
        assert!(matches!(error, ApprovalError::PermissionDenied(_)));
        let trail = engine.order_trail(OrderId(4), &uid(Role::Admin)).await.expect("trail");
        assert!(trail.is_empty());
    }

    #[tokio::test]
    async fn admin_approves_any_amount() {
        let engine = engine().await;
        for (id, amount) in [(10, 1_000), (11, 99_999_999), (12, 750_000_000)] {
            add_draft(&engine, id, amount).await;
            engine.submit_for_approval(OrderId(id), &uid(Role::FieldWorker)).await.expect("submit");
            let approved = engine
                .approve_order(OrderId(id), &uid(Role::Admin), Some("ok".into()))
                .await
                .expect("admin approval");
            assert_eq!(approved.order.status, OrderStatus::Approved);
        }
    }

    #[tokio::test]
    async fn pending_orders_record_the_resolved_role() {
        let engine = engine().await;
        for (id, amount) in
            [(20, 0), (21, 4_999_999), (22, 5_000_000), (23, 30_000_000), (24, 100_000_000)]
        {
            add_draft(&engine, id, amount).await;
            engine.submit_for_approval(OrderId(id), &uid(Role::FieldWorker)).await.expect("submit");
        }

        let pending = engine.pending_approvals(&uid(Role::Admin)).await.expect("pending");
        assert_eq!(pending.len(), 5);
        for order in pending {
            let expected = resolve_required_role(order.total_amount);
            assert_eq!(order.current_approver_role, Some(expected));
        }
    }

    #[tokio::test]
    async fn submit_requires_a_draft_order() {
        let engine = engine().await;
        let now = Utc::now();
        add_pending(&engine, 5, 1_000, now - Duration::hours(1)).await;

        let error = engine
            .submit_for_approval(OrderId(5), &uid(Role::FieldWorker))
            .await
            .expect_err("pending order cannot be resubmitted");
        assert!(matches!(error, ApprovalError::InvalidState(_)));
    }

    #[tokio::test]
    async fn approving_a_draft_is_an_invalid_state() {
        let engine = engine().await;
        add_draft(&engine, 6, 1_000).await;

        let error = engine
            .approve_order(OrderId(6), &uid(Role::Admin), None)
            .await
            .expect_err("draft cannot be approved");
        assert!(matches!(error, ApprovalError::InvalidState(_)));
    }

    #[tokio::test]
    async fn missing_user_or_order_is_not_found() {
        let engine = engine().await;
        let now = Utc::now();
        add_pending(&engine, 7, 1_000, now - Duration::hours(1)).await;

        let error = engine
            .approve_order(OrderId(7), &UserId("ghost".into()), None)
            .await
            .expect_err("unknown user");
        assert_eq!(error, ApprovalError::UserNotFound("ghost".into()));

        let error = engine
            .approve_order(OrderId(700), &uid(Role::Admin), None)
            .await
            .expect_err("unknown order");
        assert_eq!(error, ApprovalError::OrderNotFound(OrderId(700)));

        let error = engine.stats(&UserId("ghost".into())).await.expect_err("unknown user");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn concurrent_approvals_produce_one_transition_and_one_conflict() {
        let engine = Arc::new(engine().await);
        let now = Utc::now();
        add_pending(&engine, 8, 1_000_000, now - Duration::hours(1)).await;

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine.approve_order(OrderId(8), &uid(Role::ProjectManager), None).await
            })
        };
        let second = {
            let engine = Arc::clone(&engine);
            tokio::spawn(
                async move { engine.approve_order(OrderId(8), &uid(Role::Admin), None).await },
            )
        };

        let results = [first.await.expect("join"), second.await.expect("join")];
        let successes = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(successes, 1);
        for result in results.iter().filter_map(|result| result.as_ref().err()) {
            assert!(matches!(
                result,
                ApprovalError::Conflict { .. } | ApprovalError::InvalidState(_)
            ));
        }

        let trail = engine.order_trail(OrderId(8), &uid(Role::Admin)).await.expect("trail");
        assert_eq!(trail.len(), 1);
    }

    #[tokio::test]
    async fn stats_for_full_visibility_user() {
        let engine = engine().await;
        let now = Utc::now();
        add_pending(&engine, 30, 1_000_000, now - Duration::days(1)).await;
        add_pending(&engine, 31, 2_000_000, now - Duration::days(4)).await;
        add_pending(&engine, 32, 3_000_000, now - Duration::days(6)).await;

        let stats = engine.stats_at(&uid(Role::Admin), now).await.expect("stats");
        assert_eq!(stats.pending_count, 3);
        assert_eq!(stats.urgent_count, 2);
        assert_eq!(stats.average_wait_days, 4);
        assert_eq!(stats.pending_amount, Decimal::new(6_000_000, 0));
    }

    #[tokio::test]
    async fn stats_are_scoped_to_orders_the_user_can_act_on() {
        let engine = engine().await;
        let now = Utc::now();
        add_pending(&engine, 40, 1_000_000, now - Duration::days(5)).await;
        add_pending(&engine, 41, 10_000_000, now - Duration::days(1)).await;
        add_pending(&engine, 42, 60_000_000, now - Duration::days(1)).await;

        let manager = engine.stats_at(&uid(Role::ProjectManager), now).await.expect("stats");
        assert_eq!(manager.pending_count, 1);
        assert_eq!(manager.urgent_count, 1);
        assert_eq!(manager.pending_amount, Decimal::new(1_000_000, 0));

        let hq = engine.pending_approvals(&uid(Role::HqManagement)).await.expect("pending");
        let ids: Vec<OrderId> = hq.iter().map(|order| order.id).collect();
        assert_eq!(ids, vec![OrderId(40), OrderId(41)]);

        let field = engine.stats_at(&uid(Role::FieldWorker), now).await.expect("stats");
        assert_eq!(field.pending_count, 0);
        assert_eq!(field.average_wait_days, 0);
    }

    #[tokio::test]
    async fn approval_history_lists_the_users_approvals_newest_first() {
        let engine = engine().await;
        let now = Utc::now();
        add_pending(&engine, 50, 1_000, now - Duration::days(2)).await;
        add_pending(&engine, 51, 2_000, now - Duration::days(1)).await;
        add_pending(&engine, 52, 3_000, now - Duration::days(1)).await;

        engine.approve_order(OrderId(50), &uid(Role::Executive), None).await.expect("approve");
        engine.approve_order(OrderId(51), &uid(Role::Executive), None).await.expect("approve");
        engine.approve_order(OrderId(52), &uid(Role::Admin), None).await.expect("approve");

        let history = engine.approval_history(&uid(Role::Executive)).await.expect("history");
        let ids: Vec<OrderId> = history.iter().map(|order| order.id).collect();
        assert_eq!(ids, vec![OrderId(51), OrderId(50)]);
    }

    #[tokio::test]
    async fn ladder_resolver_is_used_for_submission_and_permission_alike() {
        let engine = engine_with(EngineSettings {
            resolver: ResolverStrategy::AuthorityLadder,
            ..EngineSettings::default()
        })
        .await;
        add_draft(&engine, 60, 5_000_000).await;

        let submitted = engine
            .submit_for_approval(OrderId(60), &uid(Role::FieldWorker))
            .await
            .expect("submit");
        assert_eq!(submitted.order.current_approver_role, Some(Role::ProjectManager));

        engine
            .approve_order(OrderId(60), &uid(Role::ProjectManager), None)
            .await
            .expect("ladder lets project manager approve at its ceiling");
    }

    #[tokio::test]
    async fn only_admin_edits_authorities_and_ceilings_must_be_non_negative() {
        let engine = engine().await;
        let update = AuthorityUpdate {
            role: Role::FieldWorker,
            max_amount: Some(Decimal::new(100_000, 0)),
            description: Some("petty cash".into()),
            is_active: true,
        };

        let error = engine
            .update_authority(&uid(Role::Executive), update.clone())
            .await
            .expect_err("executive is not admin");
        assert!(matches!(error, ApprovalError::PermissionDenied(_)));

        let error = engine
            .update_authority(
                &uid(Role::Admin),
                AuthorityUpdate { max_amount: Some(Decimal::new(-1, 0)), ..update.clone() },
            )
            .await
            .expect_err("negative ceiling");
        assert!(matches!(error, ApprovalError::InvalidInput(_)));

        engine.update_authority(&uid(Role::Admin), update).await.expect("admin update");
        let permissions =
            engine.user_approval_permissions(&uid(Role::FieldWorker)).await.expect("permissions");
        assert!(permissions.can_approve);
        assert_eq!(permissions.max_amount, Some(Decimal::new(100_000, 0)));

        let authorities = engine.list_authorities(&uid(Role::Admin)).await.expect("list");
        let roles: Vec<Role> = authorities.iter().map(|authority| authority.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::Admin,
                Role::Executive,
                Role::HqManagement,
                Role::ProjectManager,
                Role::FieldWorker
            ]
        );
    }

    #[tokio::test]
    async fn check_permission_reports_the_reason_without_side_effects() {
        let engine = engine().await;
        let now = Utc::now();
        add_pending(&engine, 70, 50_000_000, now - Duration::hours(3)).await;

        let decision =
            engine.check_permission(OrderId(70), &uid(Role::HqManagement)).await.expect("check");
        assert!(!decision.allowed);
        assert!(decision.reason.contains("approval limit of 30000000"));
        let trail = engine.order_trail(OrderId(70), &uid(Role::Admin)).await.expect("trail");
        assert!(trail.is_empty());
    }

    #[tokio::test]
    async fn trail_and_authority_listing_require_a_known_caller() {
        let engine = engine().await;
        add_draft(&engine, 80, 1_000).await;
        let ghost = UserId("ghost".to_string());

        let error = engine.order_trail(OrderId(80), &ghost).await.expect_err("unknown caller");
        assert!(matches!(error, ApprovalError::UserNotFound(_)));

        let error = engine.list_authorities(&ghost).await.expect_err("unknown caller");
        assert!(matches!(error, ApprovalError::UserNotFound(_)));

        let error = engine
            .list_authorities(&uid(Role::Executive))
            .await
            .expect_err("listing is admin only");
        assert!(matches!(error, ApprovalError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn role_authority_reflects_the_active_table() {
        let engine = engine().await;

        let manager = engine
            .role_authority(&uid(Role::ProjectManager), Role::HqManagement)
            .await
            .expect("lookup");
        assert!(manager.has_authority);
        assert_eq!(manager.max_amount, Some(Decimal::new(30_000_000, 0)));

        let admin =
            engine.role_authority(&uid(Role::Admin), Role::Admin).await.expect("lookup");
        assert!(admin.has_authority);
        assert_eq!(admin.max_amount, None);

        let field = engine
            .role_authority(&uid(Role::Executive), Role::FieldWorker)
            .await
            .expect("lookup");
        assert!(!field.has_authority);
        assert_eq!(field.max_amount, Some(Decimal::ZERO));

        let error = engine
            .role_authority(&uid(Role::FieldWorker), Role::Executive)
            .await
            .expect_err("field worker may not inspect authorities");
        assert!(matches!(error, ApprovalError::PermissionDenied(_)));
    }
}
