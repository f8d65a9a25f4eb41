use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use procure_core::approvals::{
    ApprovalEngine, ApprovalPermissions, ApprovalStats, ApprovalStore, AuthorityUpdate,
    PermissionDecision, RoleAuthority,
};
use procure_core::domain::approval::{ApprovalAuthority, ApprovalHistoryEntry};
use procure_core::domain::order::{OrderId, PurchaseOrder};
use procure_core::domain::role::Role;
use procure_core::domain::user::UserId;
use procure_core::errors::{ApprovalError, InterfaceError};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

pub const CALLER_HEADER: &str = "x-user-id";

pub struct ApprovalsState<S> {
    engine: Arc<ApprovalEngine<S>>,
}

impl<S> Clone for ApprovalsState<S> {
    fn clone(&self) -> Self {
        Self { engine: Arc::clone(&self.engine) }
    }
}

/// Identity of the authenticated caller, as forwarded by the identity layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl<T> FromRequestParts<T> for Caller
where
    T: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(parts: &mut Parts, _state: &T) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Caller(UserId(value.to_string())))
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ApiError {
                        error: format!("missing `{CALLER_HEADER}` header"),
                        correlation_id: None,
                    }),
                )
            })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityRequest {
    /// Outer `None` when the field is absent; `Some(None)` is an explicit unbounded ceiling.
    #[serde(default, deserialize_with = "present")]
    pub max_amount: Option<Option<Decimal>>,
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<Decimal>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Decimal>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<PurchaseOrder>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

type ReadResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;
type ActionResult = Result<Json<ActionResponse>, (StatusCode, Json<ActionResponse>)>;

pub fn router<S>(engine: Arc<ApprovalEngine<S>>) -> Router
where
    S: ApprovalStore + 'static,
{
    Router::new()
        .route("/approvals/stats", get(stats::<S>))
        .route("/approvals/pending", get(pending::<S>))
        .route("/approvals/history", get(history::<S>))
        .route("/approvals/permissions", get(permissions::<S>))
        .route("/approvals/{id}/submit", post(submit::<S>))
        .route("/approvals/{id}/approve", post(approve::<S>))
        .route("/approvals/{id}/reject", post(reject::<S>))
        .route("/approvals/{id}/trail", get(trail::<S>))
        .route("/approvals/{id}/can-act", get(can_act::<S>))
        .route("/approval-authorities", get(list_authorities::<S>))
        .route("/approval-authorities/role/{role}", get(role_authority::<S>))
        .route("/approval-authorities/{role}", put(update_authority::<S>))
        .with_state(ApprovalsState { engine })
}

async fn stats<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    State(state): State<ApprovalsState<S>>,
) -> ReadResult<ApprovalStats> {
    state.engine.stats(&user_id).await.map(Json).map_err(read_error)
}

async fn pending<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    State(state): State<ApprovalsState<S>>,
) -> ReadResult<Vec<PurchaseOrder>> {
    state.engine.pending_approvals(&user_id).await.map(Json).map_err(read_error)
}

async fn history<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    State(state): State<ApprovalsState<S>>,
) -> ReadResult<Vec<PurchaseOrder>> {
    state.engine.approval_history(&user_id).await.map(Json).map_err(read_error)
}

async fn permissions<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    State(state): State<ApprovalsState<S>>,
) -> ReadResult<ApprovalPermissions> {
    state.engine.user_approval_permissions(&user_id).await.map(Json).map_err(read_error)
}

async fn trail<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    Path(id): Path<i64>,
    State(state): State<ApprovalsState<S>>,
) -> ReadResult<Vec<ApprovalHistoryEntry>> {
    state.engine.order_trail(OrderId(id), &user_id).await.map(Json).map_err(read_error)
}

async fn can_act<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    Path(id): Path<i64>,
    State(state): State<ApprovalsState<S>>,
) -> ReadResult<PermissionDecision> {
    state.engine.check_permission(OrderId(id), &user_id).await.map(Json).map_err(read_error)
}

async fn list_authorities<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    State(state): State<ApprovalsState<S>>,
) -> ReadResult<Vec<ApprovalAuthority>> {
    state.engine.list_authorities(&user_id).await.map(Json).map_err(read_error)
}

async fn role_authority<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    Path(role): Path<String>,
    State(state): State<ApprovalsState<S>>,
) -> ReadResult<RoleAuthority> {
    let role = Role::from_str(&role).map_err(|error| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: error.to_string(), correlation_id: None }),
        )
    })?;
    state.engine.role_authority(&user_id, role).await.map(Json).map_err(read_error)
}

async fn submit<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    Path(id): Path<i64>,
    State(state): State<ApprovalsState<S>>,
) -> ActionResult {
    let outcome =
        state.engine.submit_for_approval(OrderId(id), &user_id).await.map_err(action_error)?;
    Ok(Json(ActionResponse {
        success: true,
        message: outcome.message,
        order: Some(outcome.order),
    }))
}

async fn approve<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    Path(id): Path<i64>,
    State(state): State<ApprovalsState<S>>,
    body: Bytes,
) -> ActionResult {
    let request = decision_request(&body)?;
    let outcome = state
        .engine
        .approve_order(OrderId(id), &user_id, request.note)
        .await
        .map_err(action_error)?;
    Ok(Json(ActionResponse {
        success: true,
        message: outcome.message,
        order: Some(outcome.order),
    }))
}

async fn reject<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    Path(id): Path<i64>,
    State(state): State<ApprovalsState<S>>,
    body: Bytes,
) -> ActionResult {
    let request = decision_request(&body)?;
    let outcome = state
        .engine
        .reject_order(OrderId(id), &user_id, request.note)
        .await
        .map_err(action_error)?;
    Ok(Json(ActionResponse {
        success: true,
        message: outcome.message,
        order: Some(outcome.order),
    }))
}

async fn update_authority<S: ApprovalStore + 'static>(
    Caller(user_id): Caller,
    Path(role): Path<String>,
    State(state): State<ApprovalsState<S>>,
    Json(body): Json<AuthorityRequest>,
) -> Result<Json<ApprovalAuthority>, (StatusCode, Json<ActionResponse>)> {
    let role = Role::from_str(&role).map_err(|error| failure(StatusCode::BAD_REQUEST, error))?;
    let max_amount = body.max_amount.ok_or_else(|| {
        failure(
            StatusCode::BAD_REQUEST,
            "`maxAmount` is required; send null for an unbounded ceiling",
        )
    })?;
    let update = AuthorityUpdate {
        role,
        max_amount,
        description: body.description,
        is_active: body.is_active,
    };

    state.engine.update_authority(&user_id, update).await.map(Json).map_err(action_error)
}

/// Decision bodies are optional; an empty body means "no note".
fn decision_request(body: &Bytes) -> Result<DecisionRequest, (StatusCode, Json<ActionResponse>)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(DecisionRequest::default());
    }

    serde_json::from_slice(body).map_err(|error| {
        failure(StatusCode::BAD_REQUEST, format!("invalid request body: {error}"))
    })
}

fn read_error(error: ApprovalError) -> (StatusCode, Json<ApiError>) {
    let correlation_id = Uuid::new_v4().to_string();
    let interface = error.into_interface(correlation_id.clone());

    let (status, message) = match &interface {
        InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message.clone()),
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
        InterfaceError::Conflict { message, .. } => (StatusCode::CONFLICT, message.clone()),
        InterfaceError::Internal { message, .. } => {
            error!(
                event_name = "http.approvals.internal_error",
                correlation_id = %correlation_id,
                error = %message,
                "approval read failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, interface.user_message().to_string())
        }
    };

    (status, Json(ApiError { error: message, correlation_id: Some(correlation_id) }))
}

fn action_error(error: ApprovalError) -> (StatusCode, Json<ActionResponse>) {
    let correlation_id = Uuid::new_v4().to_string();
    let interface = error.into_interface(correlation_id.clone());

    match &interface {
        InterfaceError::Conflict { message, .. } => {
            warn!(
                event_name = "http.approvals.conflict",
                correlation_id = %correlation_id,
                error = %message,
                "approval action lost a concurrent update"
            );
            failure(StatusCode::CONFLICT, message)
        }
        InterfaceError::Internal { message, .. } => {
            error!(
                event_name = "http.approvals.internal_error",
                correlation_id = %correlation_id,
                error = %message,
                "approval action failed"
            );
            failure(StatusCode::INTERNAL_SERVER_ERROR, interface.user_message())
        }
        InterfaceError::BadRequest { message, .. } | InterfaceError::NotFound { message, .. } => {
            failure(StatusCode::BAD_REQUEST, message)
        }
    }
}

fn failure(status: StatusCode, message: impl ToString) -> (StatusCode, Json<ActionResponse>) {
    (status, Json(ActionResponse { success: false, message: message.to_string(), order: None }))
}
