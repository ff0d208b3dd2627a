use thiserror::Error;

use crate::authorization::Capability;
use crate::domain::approval::{ActorId, ApprovalAction, ApprovalStatus};
use crate::domain::subject::{SubjectRef, SubjectType};
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("an acting user must be set before `{action}`")]
    MissingActor { action: ApprovalAction },
    #[error("force requires a target status")]
    MissingStatus,
    #[error("invalid transition from {from} using action {action}")]
    InvalidTransition { from: ApprovalStatus, action: ApprovalAction },
    #[error("actor `{actor}` lacks `{capability}` capability on `{subject_type}`")]
    Unauthorized { actor: ActorId, subject_type: SubjectType, capability: Capability },
    #[error("subject {0} not found")]
    SubjectNotFound(SubjectRef),
    #[error("store write failed: {0}")]
    StoreWrite(String),
    #[error("store read failed: {0}")]
    StoreRead(String),
}

impl ApprovalError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingActor { .. } => "missing_actor",
            Self::MissingStatus => "missing_status",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Unauthorized { .. } => "unauthorized",
            Self::SubjectNotFound(_) => "subject_not_found",
            Self::StoreWrite(_) => "store_write",
            Self::StoreRead(_) => "store_read",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self {
            Self::MissingActor { .. } | Self::MissingStatus => {
                InterfaceError::BadRequest { message, correlation_id }
            }
            Self::Unauthorized { .. } => InterfaceError::Forbidden { message, correlation_id },
            Self::SubjectNotFound(_) => InterfaceError::NotFound { message, correlation_id },
            Self::InvalidTransition { .. } => InterfaceError::Conflict { message, correlation_id },
            Self::StoreWrite(_) | Self::StoreRead(_) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}

impl From<StoreError> for ApprovalError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::SubjectNotFound(subject) => Self::SubjectNotFound(subject),
            StoreError::Read(message) => Self::StoreRead(message),
            StoreError::Write(message) => Self::StoreWrite(message),
            conflict @ StoreError::Conflict { .. } => Self::StoreWrite(conflict.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this approval action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The record changed state before this action could be applied. Reload and retry."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}
