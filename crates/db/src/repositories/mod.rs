use thiserror::Error;

use ratify_core::store::StoreError;

pub mod approval_event;

pub use approval_event::SqlApprovalEventStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn into_read(self) -> StoreError {
        StoreError::Read(self.to_string())
    }

    pub fn into_write(self) -> StoreError {
        StoreError::Write(self.to_string())
    }
}
