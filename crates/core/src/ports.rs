//! Persistence port consumed by the workflow service.

use async_trait::async_trait;
use chrono::Datelike;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::document::{Document, DocumentId};
use crate::domain::invoice::{Invoice, InvoiceId};
use crate::domain::request::{Request, RequestId};
use crate::domain::user::{User, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("version conflict on `{id}`: expected {expected}, found {actual}")]
    Conflict { id: String, expected: u64, actual: u64 },
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Sequence namespace for id allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdScope {
    pub prefix: &'static str,
    pub year: Option<i32>,
}

impl IdScope {
    pub fn format(&self, sequence: u32) -> String {
        match self.year {
            Some(year) => format!("{}-{year}-{sequence:03}", self.prefix),
            None => format!("{}-{sequence:03}", self.prefix),
        }
    }

    /// Recovers the sequence number from an id in this scope.
    pub fn sequence_of(&self, id: &str) -> Option<u32> {
        let head = match self.year {
            Some(year) => format!("{}-{year}-", self.prefix),
            None => format!("{}-", self.prefix),
        };
        id.strip_prefix(&head)?.parse().ok()
    }
}

/// A versioned record a `Store` can hold.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn assign_id(&mut self, id: String);
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
    fn id_scope(&self) -> IdScope;
}

impl Entity for Request {
    const KIND: &'static str = "request";

    fn id(&self) -> &str {
        &self.id.0
    }

    fn assign_id(&mut self, id: String) {
        self.id = RequestId(id);
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn id_scope(&self) -> IdScope {
        IdScope { prefix: "REQ", year: Some(self.created.year()) }
    }
}

impl Entity for Invoice {
    const KIND: &'static str = "invoice";

    fn id(&self) -> &str {
        &self.id.0
    }

    fn assign_id(&mut self, id: String) {
        self.id = InvoiceId(id);
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn id_scope(&self) -> IdScope {
        IdScope { prefix: "INV", year: Some(self.issue_date.year()) }
    }
}

impl Entity for Document {
    const KIND: &'static str = "document";

    fn id(&self) -> &str {
        &self.id.0
    }

    fn assign_id(&mut self, id: String) {
        self.id = DocumentId(id);
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn id_scope(&self) -> IdScope {
        IdScope { prefix: "DOC", year: None }
    }
}

impl Entity for User {
    const KIND: &'static str = "user";

    fn id(&self) -> &str {
        &self.id.0
    }

    fn assign_id(&mut self, id: String) {
        self.id = UserId(id);
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn id_scope(&self) -> IdScope {
        IdScope { prefix: "USR", year: None }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StoreChange<E> {
    Created(E),
    Updated(E),
    Removed(E),
}

impl<E: Entity> StoreChange<E> {
    pub fn entity(&self) -> &E {
        match self {
            Self::Created(entity) | Self::Updated(entity) | Self::Removed(entity) => entity,
        }
    }
}

/// Versioned keyed storage with a live change feed.
///
/// `create` allocates the id and starts the version at 1. `update` is a
/// compare-and-swap on the version: it fails with `Conflict` when the stored
/// version differs from `expected_version`, and otherwise bumps it.
#[async_trait]
pub trait Store<E: Entity>: Send + Sync {
    async fn create(&self, entity: E) -> Result<E, StoreError>;
    async fn update(&self, entity: E, expected_version: u64) -> Result<E, StoreError>;
    async fn get_by_id(&self, id: &str) -> Result<Option<E>, StoreError>;
    async fn list(&self) -> Result<Vec<E>, StoreError>;
    async fn remove(&self, id: &str) -> Result<E, StoreError>;

    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange<E>>;
}

#[cfg(test)]
mod tests {
    use super::IdScope;

    #[test]
    fn ids_are_zero_padded_per_scope() {
        let requests = IdScope { prefix: "REQ", year: Some(2026) };
        assert_eq!(requests.format(7), "REQ-2026-007");
        assert_eq!(requests.format(1234), "REQ-2026-1234");
        assert_eq!(IdScope { prefix: "DOC", year: None }.format(12), "DOC-012");
    }

    #[test]
    fn sequence_is_recovered_only_within_scope() {
        let requests = IdScope { prefix: "REQ", year: Some(2026) };
        assert_eq!(requests.sequence_of("REQ-2026-042"), Some(42));
        assert_eq!(requests.sequence_of("REQ-2025-042"), None);
        assert_eq!(requests.sequence_of("INV-2026-042"), None);
        assert_eq!(IdScope { prefix: "USR", year: None }.sequence_of("USR-006"), Some(6));
    }
}
