pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

use std::sync::Arc;

use tripdesk_core::audit::InMemoryAuditLog;
use tripdesk_core::domain::document::Document;
use tripdesk_core::domain::invoice::Invoice;
use tripdesk_core::domain::request::Request;
use tripdesk_core::domain::user::User;
use tripdesk_core::notify::Notifier;
use tripdesk_core::ports::StoreError;
use tripdesk_core::service::WorkflowPorts;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoDataset, SeedResult, SeedTargets, VerificationResult};
pub use repositories::{InMemoryStore, RepositoryError, SqlAuditSink, SqlStore};

/// Ports backed by SQLite tables in `pool`.
pub fn sqlite_ports(pool: &DbPool, notifier: Arc<dyn Notifier>) -> WorkflowPorts {
    WorkflowPorts {
        requests: Arc::new(SqlStore::<Request>::new(pool.clone())),
        invoices: Arc::new(SqlStore::<Invoice>::new(pool.clone())),
        documents: Arc::new(SqlStore::<Document>::new(pool.clone())),
        users: Arc::new(SqlStore::<User>::new(pool.clone())),
        audit: Arc::new(SqlAuditSink::new(pool.clone())),
        notifier,
    }
}

/// Ports backed by process-local stores. The audit log handle is returned so
/// callers can inspect it directly.
pub fn in_memory_ports(notifier: Arc<dyn Notifier>) -> (WorkflowPorts, InMemoryAuditLog) {
    let audit = InMemoryAuditLog::default();
    let ports = WorkflowPorts {
        requests: Arc::new(InMemoryStore::<Request>::new()),
        invoices: Arc::new(InMemoryStore::<Invoice>::new()),
        documents: Arc::new(InMemoryStore::<Document>::new()),
        users: Arc::new(InMemoryStore::<User>::new()),
        audit: Arc::new(audit.clone()),
        notifier,
    };
    (ports, audit)
}

fn seed_targets(ports: &WorkflowPorts) -> SeedTargets<'_> {
    SeedTargets {
        users: ports.users.as_ref(),
        requests: ports.requests.as_ref(),
        documents: ports.documents.as_ref(),
        invoices: ports.invoices.as_ref(),
    }
}

/// Seeds the demo dataset through the stores held by `ports`.
pub async fn seed_demo(ports: &WorkflowPorts) -> Result<SeedResult, StoreError> {
    DemoDataset::load(&seed_targets(ports)).await
}

pub async fn verify_demo(ports: &WorkflowPorts) -> Result<VerificationResult, StoreError> {
    DemoDataset::verify(&seed_targets(ports)).await
}
