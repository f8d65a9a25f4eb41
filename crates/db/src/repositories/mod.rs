use thiserror::Error;

use procure_core::approvals::store::StoreError;

pub mod approval;

pub use approval::SqlApprovalStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Database(error.to_string()),
            RepositoryError::Decode(message) => Self::Decode(message),
        }
    }
}
