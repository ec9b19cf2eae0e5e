pub mod audit;
pub mod authz;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod notify;
pub mod ports;
pub mod rbac;
pub mod service;

pub use audit::{AuditAction, AuditEntry, AuditError, AuditEvent, AuditQuery, AuditSink, InMemoryAuditLog};
pub use authz::{allowed_actions, menu_visibility, MenuVisibility};
pub use domain::document::{Document, DocumentId, DocumentType, DocumentUpload};
pub use domain::invoice::{Invoice, InvoiceDraft, InvoiceId, InvoiceStats, InvoiceStatus, LineItem};
pub use domain::request::{Request, RequestDetails, RequestDraft, RequestEdit, RequestId, RequestStatus, RequestType};
pub use domain::user::{AuthError, NewUser, Password, Role, User, UserId, UserStatus};
pub use errors::{ApplicationError, InterfaceError, WorkflowError};
pub use flows::{RequestAction, RequestCommand, RequestLifecycle, TransitionOutcome};
pub use notify::{InMemoryNotifier, NoopNotifier, Notification, NotificationPayload, Notifier};
pub use ports::{Entity, IdScope, Store, StoreChange, StoreError};
pub use rbac::{has_permission, Permission};
pub use service::{DegradedDelivery, Receipt, TransitionResult, WorkflowPorts, WorkflowService};
