use thiserror::Error;

use crate::domain::order::{OrderId, OrderStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from} to {to}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("unknown role `{0}`")]
    UnknownRole(String),
    #[error("unknown order status `{0}`")]
    UnknownOrderStatus(String),
}

/// Failure taxonomy shared by every approval operation, reads included.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("user `{0}` not found")]
    UserNotFound(String),
    #[error("purchase order {0} not found")]
    OrderNotFound(OrderId),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("purchase order {order_id} was modified concurrently; expected status {expected}")]
    Conflict { order_id: OrderId, expected: OrderStatus },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl ApprovalError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UserNotFound(_) | Self::OrderNotFound(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The purchase order was changed by another request. Reload and try again."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApprovalError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApprovalError> for InterfaceError {
    fn from(value: ApprovalError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApprovalError::UserNotFound(_) | ApprovalError::OrderNotFound(_) => {
                Self::NotFound { message: value.to_string(), correlation_id }
            }
            ApprovalError::PermissionDenied(_)
            | ApprovalError::InvalidState(_)
            | ApprovalError::InvalidInput(_)
            | ApprovalError::Domain(_) => {
                Self::BadRequest { message: value.to_string(), correlation_id }
            }
            ApprovalError::Conflict { .. } => {
                Self::Conflict { message: value.to_string(), correlation_id }
            }
            ApprovalError::Internal(message) => Self::Internal { message, correlation_id },
        }
    }
}
