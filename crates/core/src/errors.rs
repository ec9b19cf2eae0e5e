use thiserror::Error;

use crate::{
    domain::document::{DocumentId, NotForwardableReason},
    ports::StoreError,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("unauthorized: insufficient role or ownership")]
    Unauthorized,
    #[error("invalid transition: `{action}` is not legal from {status}")]
    InvalidTransition { status: String, action: String },
    #[error("stale state for `{entity_id}`: expected {expected}, found {found}")]
    StaleState { entity_id: String, expected: String, found: String },
    #[error("document `{document_id}` cannot be forwarded: {reason}")]
    NotForwardable { document_id: DocumentId, reason: NotForwardableReason },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("store failure: {0}")]
    Store(String),
}

impl WorkflowError {
    pub fn invalid_transition(status: impl ToString, action: impl ToString) -> Self {
        Self::InvalidTransition { status: status.to_string(), action: action.to_string() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Conflict { id, expected, actual } => Self::StaleState {
                entity_id: id,
                expected: format!("version {expected}"),
                found: format!("version {actual}"),
            },
            StoreError::Backend(message) => Self::Store(message),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You do not have permission to perform this action.",
            Self::Conflict { .. } => {
                "This record changed since you loaded it. Refresh and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Workflow(error) => {
                let message = error.to_string();
                match error {
                    WorkflowError::Unauthorized => Self::Forbidden { message, correlation_id },
                    WorkflowError::StaleState { .. } => Self::Conflict { message, correlation_id },
                    WorkflowError::NotFound { .. } => Self::NotFound { message, correlation_id },
                    WorkflowError::InvalidTransition { .. }
                    | WorkflowError::NotForwardable { .. }
                    | WorkflowError::Validation(_) => Self::BadRequest { message, correlation_id },
                    WorkflowError::Store(_) => {
                        Self::ServiceUnavailable { message, correlation_id }
                    }
                }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}
