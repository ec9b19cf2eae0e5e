use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use tripdesk_core::domain::document::Document;
use tripdesk_core::domain::invoice::Invoice;
use tripdesk_core::domain::request::Request;
use tripdesk_core::domain::user::{User, UserStatus};
use tripdesk_core::ports::{Entity, IdScope, StoreError};

pub mod audit;
pub mod memory;
pub mod sql;

pub use audit::SqlAuditSink;
pub use memory::InMemoryStore;
pub use sql::SqlStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` was not found")]
    Missing { entity: &'static str, id: String },
    #[error("version conflict on `{id}`: expected {expected}, found {actual}")]
    Conflict { id: String, expected: u64, actual: u64 },
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Missing { entity, id } => StoreError::NotFound { entity, id },
            RepositoryError::Conflict { id, expected, actual } => {
                StoreError::Conflict { id, expected, actual }
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Row mapping for an entity persisted as a versioned JSON body.
pub trait Table: Entity + Serialize + DeserializeOwned {
    const TABLE: &'static str;

    /// Indexed marker column; not read back.
    fn status_label(&self) -> &'static str;
}

impl Table for Request {
    const TABLE: &'static str = "requests";

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
}

impl Table for Invoice {
    const TABLE: &'static str = "invoices";

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
}

impl Table for Document {
    const TABLE: &'static str = "documents";

    fn status_label(&self) -> &'static str {
        if self.forwarded_to_finance {
            "FORWARDED"
        } else {
            "ON_FILE"
        }
    }
}

impl Table for User {
    const TABLE: &'static str = "users";

    fn status_label(&self) -> &'static str {
        match self.status {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
        }
    }
}

/// Stable text key for a sequence namespace, e.g. `REQ-2026` or `DOC`.
pub fn scope_key(scope: IdScope) -> String {
    match scope.year {
        Some(year) => format!("{}-{year}", scope.prefix),
        None => scope.prefix.to_string(),
    }
}
