use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use procure_core::approvals::store::{ApprovalStore, OrderTransition, StoreError};
use procure_core::domain::approval::{
    ApprovalAuthority, ApprovalHistoryEntry, HistoryAction, HistoryEntryId,
};
use procure_core::domain::order::{OrderId, OrderStatus, PurchaseOrder};
use procure_core::domain::role::Role;
use procure_core::domain::user::{User, UserId};

use super::RepositoryError;
use crate::DbPool;

const ORDER_COLUMNS: &str = "id, order_number, user_id, total_amount, status, current_approver_role,
     approval_level, is_approved, approved_by, approved_at, created_at, updated_at";

/// `ApprovalStore` over the SQLite schema in `migrations/`.
pub struct SqlApprovalStore {
    pool: DbPool,
}

impl SqlApprovalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn insert_user(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, name, role, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, role = excluded.role",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO purchase_order (id, order_number, user_id, total_amount, status,
                                         current_approver_role, approval_level, is_approved,
                                         approved_by, approved_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.id.0)
        .bind(&order.order_number)
        .bind(&order.user_id.0)
        .bind(order.total_amount.to_string())
        .bind(order.status.as_str())
        .bind(order.current_approver_role.map(Role::as_str))
        .bind(order.approval_level)
        .bind(i64::from(order.is_approved))
        .bind(order.approved_by.as_ref().map(|user| user.0.as_str()))
        .bind(order.approved_at.map(|at| at.to_rfc3339()))
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Option<PurchaseOrder>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM purchase_order WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn transition(
        &self,
        transition: OrderTransition,
    ) -> Result<Option<PurchaseOrder>, RepositoryError> {
        let OrderTransition { order_id, expected_status, patch, history } = transition;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE purchase_order
             SET status = ?, current_approver_role = ?, is_approved = ?, approved_by = ?,
                 approved_at = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(patch.status.as_str())
        .bind(patch.current_approver_role.map(Role::as_str))
        .bind(i64::from(patch.is_approved))
        .bind(patch.approved_by.as_ref().map(|user| user.0.as_str()))
        .bind(patch.approved_at.map(|at| at.to_rfc3339()))
        .bind(patch.updated_at.to_rfc3339())
        .bind(order_id.0)
        .bind(expected_status.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO order_history (id, order_id, user_id, actor_role, action, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&history.id.0)
        .bind(history.order_id.0)
        .bind(&history.user_id.0)
        .bind(history.actor_role.as_str())
        .bind(history.action.as_str())
        .bind(&history.notes)
        .bind(history.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM purchase_order WHERE id = ?"))
            .bind(order_id.0)
            .fetch_one(&mut *tx)
            .await?;
        let order = order_from_row(&row)?;

        tx.commit().await?;
        Ok(Some(order))
    }
}

#[async_trait]
impl ApprovalStore for SqlApprovalStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, name, role FROM app_user WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        Ok(self.fetch_order(id).await?)
    }

    async fn apply_transition(
        &self,
        transition: OrderTransition,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        Ok(self.transition(transition).await?)
    }

    async fn get_pending_orders(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM purchase_order
             WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(order_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_approved_orders_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PurchaseOrder>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM purchase_order
             WHERE approved_by = ? AND is_approved = 1"
        ))
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(order_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_approval_authorities(&self) -> Result<Vec<ApprovalAuthority>, StoreError> {
        let rows = sqlx::query(
            "SELECT role, max_amount, description, is_active, updated_at
             FROM approval_authorities",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(authority_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn upsert_approval_authority(
        &self,
        authority: ApprovalAuthority,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO approval_authorities (role, max_amount, description, is_active, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(role) DO UPDATE SET
                 max_amount = excluded.max_amount,
                 description = excluded.description,
                 is_active = excluded.is_active,
                 updated_at = excluded.updated_at",
        )
        .bind(authority.role.as_str())
        .bind(authority.max_amount.map(|amount| amount.to_string()))
        .bind(&authority.description)
        .bind(i64::from(authority.is_active))
        .bind(authority.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn get_order_history(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ApprovalHistoryEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, order_id, user_id, actor_role, action, notes, created_at
             FROM order_history
             WHERE order_id = ?
             ORDER BY created_at ASC",
        )
        .bind(order_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(history_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(row.try_get("id")?),
        name: row.try_get("name")?,
        role: parse_role("role", row.try_get("role")?)?,
    })
}

fn order_from_row(row: &SqliteRow) -> Result<PurchaseOrder, RepositoryError> {
    let status: String = row.try_get("status")?;
    let current_approver_role: Option<String> = row.try_get("current_approver_role")?;
    let approved_by: Option<String> = row.try_get("approved_by")?;

    Ok(PurchaseOrder {
        id: OrderId(row.try_get("id")?),
        order_number: row.try_get("order_number")?,
        user_id: UserId(row.try_get("user_id")?),
        total_amount: parse_decimal("total_amount", &row.try_get::<String, _>("total_amount")?)?,
        status: OrderStatus::from_str(&status).map_err(|error| {
            RepositoryError::Decode(format!("invalid value in `status`: {error}"))
        })?,
        current_approver_role: current_approver_role
            .map(|role| parse_role("current_approver_role", role))
            .transpose()?,
        approval_level: row.try_get("approval_level")?,
        is_approved: parse_bool_flag("is_approved", row.try_get("is_approved")?)?,
        approved_by: approved_by.map(UserId),
        approved_at: parse_optional_timestamp("approved_at", row.try_get("approved_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_optional_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn authority_from_row(row: &SqliteRow) -> Result<ApprovalAuthority, RepositoryError> {
    let max_amount: Option<String> = row.try_get("max_amount")?;

    Ok(ApprovalAuthority {
        role: parse_role("role", row.try_get("role")?)?,
        max_amount: max_amount.map(|amount| parse_decimal("max_amount", &amount)).transpose()?,
        description: row.try_get("description")?,
        is_active: parse_bool_flag("is_active", row.try_get("is_active")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn history_from_row(row: &SqliteRow) -> Result<ApprovalHistoryEntry, RepositoryError> {
    Ok(ApprovalHistoryEntry {
        id: HistoryEntryId(row.try_get("id")?),
        order_id: OrderId(row.try_get("order_id")?),
        user_id: UserId(row.try_get("user_id")?),
        actor_role: parse_role("actor_role", row.try_get("actor_role")?)?,
        action: parse_action(row.try_get("action")?)?,
        notes: row.try_get("notes")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_role(column: &str, value: String) -> Result<Role, RepositoryError> {
    Role::from_str(&value)
        .map_err(|error| RepositoryError::Decode(format!("invalid value in `{column}`: {error}")))
}

fn parse_action(value: String) -> Result<HistoryAction, RepositoryError> {
    match value.as_str() {
        "submitted" => Ok(HistoryAction::Submitted),
        "approved" => Ok(HistoryAction::Approved),
        "rejected" => Ok(HistoryAction::Rejected),
        other => Err(RepositoryError::Decode(format!("invalid history action `{other}`"))),
    }
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_bool_flag(column: &str, value: i64) -> Result<bool, RepositoryError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        raw => Err(RepositoryError::Decode(format!("invalid boolean flag for `{column}`: {raw}"))),
    }
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
