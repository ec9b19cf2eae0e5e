//! Orchestrates authorization, lifecycle rules, persistence, audit and
//! notification for every state-changing operation.
//!
//! An operation commits to the store first. Audit and notification delivery
//! happen afterwards; a failure there is logged and reported on the receipt
//! but never undoes the commit.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, AuditEvent, AuditQuery, AuditSink};
use crate::authz::{
    allowed_actions, can_access_request, can_edit_request, can_upload_document, can_view_document,
};
use crate::config::WorkflowConfig;
use crate::domain::document::{Document, DocumentId, DocumentType, DocumentUpload};
use crate::domain::invoice::{Invoice, InvoiceDraft, InvoiceId, InvoiceStats, InvoiceStatus, LineItem};
use crate::domain::request::{Request, RequestDraft, RequestEdit, RequestId, RequestStatus};
use crate::domain::user::{AuthError, NewUser, Password, Role, User, UserId, UserStatus};
use crate::errors::WorkflowError;
use crate::flows::{RequestAction, RequestCommand, RequestLifecycle, Transition, TransitionOutcome};
use crate::notify::{NoopNotifier, NotificationPayload, Notifier};
use crate::ports::{Store, StoreChange};
use crate::rbac::{has_permission, Permission};

/// Request statuses from which billing is meaningful.
const BILLABLE: [RequestStatus; 3] =
    [RequestStatus::Booked, RequestStatus::ItinerarySent, RequestStatus::Invoiced];

/// Collaborators injected at construction.
#[derive(Clone)]
pub struct WorkflowPorts {
    pub requests: Arc<dyn Store<Request>>,
    pub invoices: Arc<dyn Store<Invoice>>,
    pub documents: Arc<dyn Store<Document>>,
    pub users: Arc<dyn Store<User>>,
    pub audit: Arc<dyn AuditSink>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum DegradedDelivery {
    Audit { reason: String },
    Notification { recipient: String, reason: String },
}

/// Outcome of a committed operation plus how its side effects fared.
#[derive(Clone, Debug, PartialEq)]
pub struct Receipt<T> {
    pub value: T,
    pub correlation_id: String,
    pub audit_entry: Option<AuditEntry>,
    pub degraded: Vec<DegradedDelivery>,
}

impl<T> Receipt<T> {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionResult {
    pub request: Request,
    pub outcome: TransitionOutcome,
    /// Set for the upload actions.
    pub document: Option<Document>,
}

struct Delivery {
    correlation_id: String,
    audit_entry: Option<AuditEntry>,
    degraded: Vec<DegradedDelivery>,
}

impl Delivery {
    fn start() -> Self {
        Self { correlation_id: Uuid::new_v4().to_string(), audit_entry: None, degraded: Vec::new() }
    }

    fn event(&self, action: AuditAction, actor: &User) -> AuditEvent {
        AuditEvent::new(action, actor.name.clone(), self.correlation_id.clone())
    }

    fn finish<T>(self, value: T) -> Receipt<T> {
        Receipt {
            value,
            correlation_id: self.correlation_id,
            audit_entry: self.audit_entry,
            degraded: self.degraded,
        }
    }
}

pub struct WorkflowService {
    ports: WorkflowPorts,
    lifecycle: RequestLifecycle,
    settings: WorkflowConfig,
}

impl WorkflowService {
    pub fn new(mut ports: WorkflowPorts, settings: WorkflowConfig) -> Self {
        if !settings.notifications_enabled {
            ports.notifier = Arc::new(NoopNotifier);
        }
        Self { ports, lifecycle: RequestLifecycle::new(), settings }
    }

    pub fn settings(&self) -> &WorkflowConfig {
        &self.settings
    }

    pub fn subscribe_requests(&self) -> broadcast::Receiver<StoreChange<Request>> {
        self.ports.requests.subscribe()
    }

    /// Resolves the caller against the user store, so a suspension or role
    /// change applies to copies of the user handed out before it. Unknown
    /// and suspended accounts act as nobody.
    async fn session(&self, actor: &User) -> Result<Option<User>, WorkflowError> {
        let stored = self.ports.users.get_by_id(&actor.id.0).await?;
        Ok(stored.filter(User::is_active))
    }

    async fn authorize(
        &self,
        actor: &User,
        check: impl FnOnce(&User) -> bool,
    ) -> Result<User, WorkflowError> {
        match self.session(actor).await? {
            Some(user) if check(&user) => Ok(user),
            _ => Err(WorkflowError::Unauthorized),
        }
    }

    async fn require(&self, actor: &User, permission: Permission) -> Result<User, WorkflowError> {
        self.authorize(actor, |user| has_permission(Some(user), permission)).await
    }

    async fn record(&self, delivery: &mut Delivery, event: AuditEvent) {
        let action = event.action;
        match self.ports.audit.append(event).await {
            Ok(entry) => delivery.audit_entry = Some(entry),
            Err(error) => {
                warn!(
                    event_name = "workflow.delivery_degraded",
                    correlation_id = %delivery.correlation_id,
                    channel = "audit",
                    audit_action = %action,
                    error = %error,
                    "audit append failed; operation stays committed"
                );
                delivery.degraded.push(DegradedDelivery::Audit { reason: error.to_string() });
            }
        }
    }

    async fn notify(&self, delivery: &mut Delivery, recipient: &str, payload: NotificationPayload) {
        if let Err(error) = self.ports.notifier.send(recipient, payload).await {
            warn!(
                event_name = "workflow.delivery_degraded",
                correlation_id = %delivery.correlation_id,
                channel = "notification",
                recipient = %recipient,
                error = %error,
                "notification failed; operation stays committed"
            );
            delivery.degraded.push(DegradedDelivery::Notification {
                recipient: recipient.to_string(),
                reason: error.to_string(),
            });
        }
    }

    async fn load_request(&self, id: &RequestId) -> Result<Request, WorkflowError> {
        self.ports.requests.get_by_id(&id.0).await?.ok_or_else(|| WorkflowError::NotFound {
            entity: "request",
            id: id.0.clone(),
        })
    }

    async fn load_document(&self, id: &DocumentId) -> Result<Document, WorkflowError> {
        self.ports.documents.get_by_id(&id.0).await?.ok_or_else(|| WorkflowError::NotFound {
            entity: "document",
            id: id.0.clone(),
        })
    }

    async fn load_invoice(&self, id: &InvoiceId) -> Result<Invoice, WorkflowError> {
        self.ports.invoices.get_by_id(&id.0).await?.ok_or_else(|| WorkflowError::NotFound {
            entity: "invoice",
            id: id.0.clone(),
        })
    }

    async fn load_user(&self, id: &UserId) -> Result<User, WorkflowError> {
        self.ports
            .users
            .get_by_id(&id.0)
            .await?
            .ok_or_else(|| WorkflowError::NotFound { entity: "user", id: id.0.clone() })
    }

    // ---- requests -------------------------------------------------------

    pub async fn submit_request(
        &self,
        actor: &User,
        draft: RequestDraft,
    ) -> Result<Receipt<Request>, WorkflowError> {
        let actor = &self.require(actor, Permission::RequestCreate).await?;
        draft.validate()?;

        let mut delivery = Delivery::start();
        let request = self.ports.requests.create(draft.into_request(actor, Utc::now())).await?;
        info!(
            event_name = "workflow.request.submitted",
            correlation_id = %delivery.correlation_id,
            request_id = %request.id,
            requester_id = %actor.id,
            "request submitted"
        );

        let event = delivery
            .event(AuditAction::RequestCreated, actor)
            .with_detail("requestId", request.id.0.clone())
            .with_detail("type", request.request_type().as_str())
            .with_detail("title", request.title.clone())
            .with_detail("estimate", request.estimate.to_string());
        self.record(&mut delivery, event).await;

        match self.ports.users.list().await {
            Ok(users) => {
                let coordinators = users
                    .into_iter()
                    .filter(|user| user.role == Role::Coordinator && user.is_active());
                for coordinator in coordinators {
                    self.notify(
                        &mut delivery,
                        &coordinator.id.0,
                        NotificationPayload::new_submission(&request),
                    )
                    .await;
                }
            }
            Err(error) => {
                warn!(
                    event_name = "workflow.delivery_degraded",
                    correlation_id = %delivery.correlation_id,
                    channel = "notification",
                    error = %error,
                    "could not resolve coordinators for submission notice"
                );
                delivery.degraded.push(DegradedDelivery::Notification {
                    recipient: "coordinators".to_string(),
                    reason: error.to_string(),
                });
            }
        }

        Ok(delivery.finish(request))
    }

    pub async fn edit_request(
        &self,
        actor: &User,
        request_id: &RequestId,
        edit: RequestEdit,
    ) -> Result<Receipt<Request>, WorkflowError> {
        let request = self.load_request(request_id).await?;
        let actor =
            &self.authorize(actor, |user| can_edit_request(Some(user), Some(&request))).await?;
        if request.status.is_terminal() {
            return Err(WorkflowError::invalid_transition(request.status, RequestAction::Edit));
        }
        if edit.is_empty() {
            return Err(WorkflowError::validation("edit changes nothing"));
        }

        let mut next = request.clone();
        let changed = edit.apply_to(&mut next)?;
        next.updated_at = Utc::now();
        let mut delivery = Delivery::start();
        let stored = self.ports.requests.update(next, request.version).await?;

        let event = delivery
            .event(AuditAction::RequestUpdated, actor)
            .with_detail("requestId", stored.id.0.clone())
            .with_detail("fields", changed.join(","));
        self.record(&mut delivery, event).await;
        Ok(delivery.finish(stored))
    }

    pub async fn get_request(
        &self,
        actor: &User,
        request_id: &RequestId,
    ) -> Result<Request, WorkflowError> {
        let request = self.load_request(request_id).await?;
        self.authorize(actor, |user| can_access_request(Some(user), Some(&request))).await?;
        Ok(request)
    }

    pub async fn visible_requests(&self, actor: &User) -> Result<Vec<Request>, WorkflowError> {
        let session = self.session(actor).await?;
        let requests = self.ports.requests.list().await?;
        Ok(requests
            .into_iter()
            .filter(|request| can_access_request(session.as_ref(), Some(request)))
            .collect())
    }

    pub async fn allowed_actions(
        &self,
        actor: &User,
        request_id: &RequestId,
    ) -> Result<Vec<RequestAction>, WorkflowError> {
        let session = self.session(actor).await?;
        let request = self.ports.requests.get_by_id(&request_id.0).await?;
        Ok(allowed_actions(session.as_ref(), request.as_ref()))
    }

    /// Applies one lifecycle action. `expected_status` lets a caller insist
    /// on the status it last saw.
    pub async fn transition(
        &self,
        actor: &User,
        request_id: &RequestId,
        command: RequestCommand,
        expected_status: Option<RequestStatus>,
    ) -> Result<Receipt<TransitionResult>, WorkflowError> {
        let session = self.session(actor).await?;
        let request = self.load_request(request_id).await?;
        let command = self.with_default_vendor(command);
        let now = Utc::now();
        let Transition { request: next, outcome } =
            self.lifecycle.apply(session.as_ref(), &request, &command, expected_status, now)?;
        let actor = session.as_ref().ok_or(WorkflowError::Unauthorized)?;

        if let RequestCommand::StartQuoting { vendor_id: Some(vendor_id) } = &command {
            self.ensure_vendor(vendor_id).await?;
        }

        let document = match &command {
            RequestCommand::UploadItinerary(upload) => Some(
                self.store_upload(upload, DocumentType::Itinerary, &request, actor).await?,
            ),
            RequestCommand::UploadInvoice(upload) => {
                Some(self.store_upload(upload, DocumentType::Invoice, &request, actor).await?)
            }
            _ => None,
        };

        let mut delivery = Delivery::start();
        let stored = match self.ports.requests.update(next, request.version).await {
            Ok(stored) => stored,
            Err(error) => {
                if let Some(document) = &document {
                    if let Err(cleanup) = self.ports.documents.remove(&document.id.0).await {
                        warn!(
                            event_name = "workflow.document.orphaned",
                            correlation_id = %delivery.correlation_id,
                            document_id = %document.id,
                            error = %cleanup,
                            "could not discard upload after a failed transition"
                        );
                    }
                }
                return Err(error.into());
            }
        };
        info!(
            event_name = "workflow.transition.applied",
            correlation_id = %delivery.correlation_id,
            request_id = %stored.id,
            action = %outcome.action,
            from = %outcome.from,
            to = %outcome.to,
            actor_id = %actor.id,
            "request transition committed"
        );

        let event = transition_event(&delivery, actor, &command, &outcome, &stored, document.as_ref());
        self.record(&mut delivery, event).await;
        if let Some(payload) = transition_notification(&command, &stored) {
            self.notify(&mut delivery, &stored.requester_id.0, payload).await;
        }

        Ok(delivery.finish(TransitionResult { request: stored, outcome, document }))
    }

    fn with_default_vendor(&self, command: RequestCommand) -> RequestCommand {
        match command {
            RequestCommand::StartQuoting { vendor_id: None } => RequestCommand::StartQuoting {
                vendor_id: self.settings.default_vendor_id.clone().map(UserId),
            },
            other => other,
        }
    }

    async fn ensure_vendor(&self, vendor_id: &UserId) -> Result<User, WorkflowError> {
        match self.ports.users.get_by_id(&vendor_id.0).await? {
            Some(vendor) if vendor.role == Role::Vendor && vendor.is_active() => Ok(vendor),
            Some(_) => Err(WorkflowError::validation(format!(
                "`{vendor_id}` is not an active vendor"
            ))),
            None => Err(WorkflowError::NotFound { entity: "user", id: vendor_id.0.clone() }),
        }
    }

    async fn store_upload(
        &self,
        upload: &DocumentUpload,
        doc_type: DocumentType,
        request: &Request,
        actor: &User,
    ) -> Result<Document, WorkflowError> {
        let mut upload = upload.clone();
        upload.doc_type = doc_type;
        let document = upload.into_document(request.id.clone(), &actor.name, Utc::now());
        Ok(self.ports.documents.create(document).await?)
    }

    // ---- documents ------------------------------------------------------

    pub async fn upload_document(
        &self,
        actor: &User,
        request_id: &RequestId,
        upload: DocumentUpload,
    ) -> Result<Receipt<Document>, WorkflowError> {
        let request = self.load_request(request_id).await?;
        let actor =
            &self.authorize(actor, |user| can_upload_document(Some(user), Some(&request))).await?;
        if request.status.is_terminal() {
            return Err(WorkflowError::invalid_transition(
                request.status,
                RequestAction::UploadDocument,
            ));
        }
        upload.validate()?;

        let mut delivery = Delivery::start();
        let document = self
            .ports
            .documents
            .create(upload.into_document(request.id.clone(), &actor.name, Utc::now()))
            .await?;

        let event = delivery
            .event(AuditAction::DocumentUploaded, actor)
            .with_detail("requestId", request.id.0.clone())
            .with_detail("documentId", document.id.0.clone())
            .with_detail("type", document.doc_type.as_str())
            .with_detail("fileName", document.file_name.clone());
        self.record(&mut delivery, event).await;
        Ok(delivery.finish(document))
    }

    pub async fn delete_document(
        &self,
        actor: &User,
        document_id: &DocumentId,
    ) -> Result<Receipt<Document>, WorkflowError> {
        let document = self.load_document(document_id).await?;
        let request = self.ports.requests.get_by_id(&document.request_id.0).await?;
        let actor = &self
            .authorize(actor, |user| {
                has_permission(Some(user), Permission::DocumentDelete)
                    && can_access_request(Some(user), request.as_ref())
            })
            .await?;

        let mut delivery = Delivery::start();
        let removed = self.ports.documents.remove(&document.id.0).await?;
        let event = delivery
            .event(AuditAction::DocumentDeleted, actor)
            .with_detail("requestId", removed.request_id.0.clone())
            .with_detail("documentId", removed.id.0.clone())
            .with_detail("fileName", removed.file_name.clone());
        self.record(&mut delivery, event).await;
        Ok(delivery.finish(removed))
    }

    pub async fn documents_for_request(
        &self,
        actor: &User,
        request_id: &RequestId,
    ) -> Result<Vec<Document>, WorkflowError> {
        let request = self.load_request(request_id).await?;
        let session = self.session(actor).await?;
        let documents = self.ports.documents.list().await?;
        Ok(documents
            .into_iter()
            .filter(|document| can_view_document(session.as_ref(), Some(document), Some(&request)))
            .collect())
    }

    /// Flags an invoice document for finance. Legal once per document,
    /// whatever the request status.
    pub async fn forward_to_finance(
        &self,
        actor: &User,
        document_id: &DocumentId,
    ) -> Result<Receipt<Document>, WorkflowError> {
        let document = self.load_document(document_id).await?;
        let request = self.ports.requests.get_by_id(&document.request_id.0).await?;
        let actor = &self
            .authorize(actor, |user| {
                has_permission(Some(user), Permission::DocumentForwardFinance)
                    && can_access_request(Some(user), request.as_ref())
            })
            .await?;

        let mut forwarded = document.clone();
        forwarded.forward_to_finance(&actor.name, Utc::now())?;
        let mut delivery = Delivery::start();
        let stored = self.ports.documents.update(forwarded, document.version).await?;
        info!(
            event_name = "workflow.document.forwarded",
            correlation_id = %delivery.correlation_id,
            document_id = %stored.id,
            request_id = %stored.request_id,
            "invoice forwarded to finance"
        );

        let event = delivery
            .event(AuditAction::InvoiceForwarded, actor)
            .with_detail("requestId", stored.request_id.0.clone())
            .with_detail("documentId", stored.id.0.clone())
            .with_detail("fileName", stored.file_name.clone());
        self.record(&mut delivery, event).await;
        Ok(delivery.finish(stored))
    }

    async fn finance_documents(
        &self,
        actor: &User,
        forwarded: bool,
    ) -> Result<Vec<Document>, WorkflowError> {
        self.require(actor, Permission::FinanceViewInvoices).await?;
        let documents = self.ports.documents.list().await?;
        Ok(documents
            .into_iter()
            .filter(|document| {
                document.doc_type == DocumentType::Invoice
                    && document.forwarded_to_finance == forwarded
            })
            .collect())
    }

    pub async fn pending_finance_invoices(&self, actor: &User) -> Result<Vec<Document>, WorkflowError> {
        self.finance_documents(actor, false).await
    }

    pub async fn forwarded_finance_invoices(
        &self,
        actor: &User,
    ) -> Result<Vec<Document>, WorkflowError> {
        self.finance_documents(actor, true).await
    }

    // ---- invoices -------------------------------------------------------

    async fn billable_request(&self, request_id: &RequestId) -> Result<Request, WorkflowError> {
        let request = self.load_request(request_id).await?;
        if !BILLABLE.contains(&request.status) {
            return Err(WorkflowError::invalid_transition(request.status, "create_invoice"));
        }
        Ok(request)
    }

    async fn billing_vendor(&self, request: &Request) -> Result<(String, String), WorkflowError> {
        let assigned = match &request.assigned_vendor {
            Some(vendor_id) => self.ports.users.get_by_id(&vendor_id.0).await?,
            None => None,
        };
        let email = assigned.as_ref().map(|vendor| vendor.email.clone()).unwrap_or_default();
        let selected = request
            .selected_option
            .and_then(|option_id| request.quote_option(option_id))
            .map(|option| option.vendor.clone());
        let name = selected.or_else(|| {
            assigned.map(|vendor| vendor.company.unwrap_or(vendor.name))
        });
        match name {
            Some(name) => Ok((name, email)),
            None => Err(WorkflowError::validation(format!(
                "request `{}` has no vendor to bill",
                request.id
            ))),
        }
    }

    pub async fn create_invoice_from_request(
        &self,
        actor: &User,
        request_id: &RequestId,
    ) -> Result<Receipt<Invoice>, WorkflowError> {
        let actor = &self.require(actor, Permission::FinanceManageInvoices).await?;
        let request = self.billable_request(request_id).await?;
        let mut draft = InvoiceDraft::from_request(
            &request,
            Utc::now().date_naive(),
            self.settings.invoice_payment_terms_days,
        );
        let (vendor, vendor_email) = self.billing_vendor(&request).await?;
        draft.vendor = vendor;
        draft.vendor_email = vendor_email;
        self.open_invoice(actor, draft).await
    }

    pub async fn create_invoice(
        &self,
        actor: &User,
        mut draft: InvoiceDraft,
    ) -> Result<Receipt<Invoice>, WorkflowError> {
        let actor = &self.require(actor, Permission::FinanceManageInvoices).await?;
        let request = self.billable_request(&draft.request_id).await?;
        if draft.request_title.trim().is_empty() {
            draft.request_title = request.title;
        }
        self.open_invoice(actor, draft).await
    }

    async fn open_invoice(
        &self,
        actor: &User,
        draft: InvoiceDraft,
    ) -> Result<Receipt<Invoice>, WorkflowError> {
        let invoice = Invoice::open(draft, &actor.name, Utc::now())?;
        let mut delivery = Delivery::start();
        let invoice = self.ports.invoices.create(invoice).await?;
        info!(
            event_name = "workflow.invoice.created",
            correlation_id = %delivery.correlation_id,
            invoice_id = %invoice.id,
            request_id = %invoice.request_id,
            total = %invoice.totals().total,
            "invoice drafted"
        );

        let event = delivery
            .event(AuditAction::InvoiceCreated, actor)
            .with_detail("invoiceId", invoice.id.0.clone())
            .with_detail("requestId", invoice.request_id.0.clone())
            .with_detail("total", invoice.totals().total.to_string());
        self.record(&mut delivery, event).await;
        Ok(delivery.finish(invoice))
    }

    pub async fn update_line_items(
        &self,
        actor: &User,
        invoice_id: &InvoiceId,
        line_items: Vec<LineItem>,
    ) -> Result<Receipt<Invoice>, WorkflowError> {
        let actor = &self.require(actor, Permission::FinanceManageInvoices).await?;
        let invoice = self.load_invoice(invoice_id).await?;
        let mut next = invoice.clone();
        next.replace_line_items(line_items)?;

        let mut delivery = Delivery::start();
        let stored = self.ports.invoices.update(next, invoice.version).await?;
        let totals = stored.totals();
        let event = delivery
            .event(AuditAction::InvoiceUpdated, actor)
            .with_detail("invoiceId", stored.id.0.clone())
            .with_detail("subtotal", totals.subtotal.to_string())
            .with_detail("gst", totals.gst.to_string())
            .with_detail("total", totals.total.to_string());
        self.record(&mut delivery, event).await;
        Ok(delivery.finish(stored))
    }

    async fn change_invoice_status(
        &self,
        actor: &User,
        invoice_id: &InvoiceId,
        next_status: InvoiceStatus,
        action: &str,
    ) -> Result<Receipt<Invoice>, WorkflowError> {
        let actor = &self
            .authorize(actor, |user| match next_status {
                InvoiceStatus::Paid | InvoiceStatus::Overdue => {
                    has_permission(Some(user), Permission::FinanceReconcile)
                        || has_permission(Some(user), Permission::FinanceManageInvoices)
                }
                InvoiceStatus::Draft | InvoiceStatus::Sent | InvoiceStatus::Cancelled => {
                    has_permission(Some(user), Permission::FinanceManageInvoices)
                }
            })
            .await?;

        let invoice = self.load_invoice(invoice_id).await?;
        let mut next = invoice.clone();
        let previous = next.transition_to(next_status, action)?;
        let mut delivery = Delivery::start();
        let stored = self.ports.invoices.update(next, invoice.version).await?;

        let event = delivery
            .event(AuditAction::InvoiceStatusChanged, actor)
            .with_detail("invoiceId", stored.id.0.clone())
            .with_detail("action", action)
            .with_detail("from", previous.as_str())
            .with_detail("to", stored.status.as_str());
        self.record(&mut delivery, event).await;
        Ok(delivery.finish(stored))
    }

    pub async fn send_invoice(
        &self,
        actor: &User,
        invoice_id: &InvoiceId,
    ) -> Result<Receipt<Invoice>, WorkflowError> {
        self.change_invoice_status(actor, invoice_id, InvoiceStatus::Sent, "send").await
    }

    pub async fn mark_paid(
        &self,
        actor: &User,
        invoice_id: &InvoiceId,
    ) -> Result<Receipt<Invoice>, WorkflowError> {
        self.change_invoice_status(actor, invoice_id, InvoiceStatus::Paid, "mark_paid").await
    }

    pub async fn mark_overdue(
        &self,
        actor: &User,
        invoice_id: &InvoiceId,
    ) -> Result<Receipt<Invoice>, WorkflowError> {
        self.change_invoice_status(actor, invoice_id, InvoiceStatus::Overdue, "mark_overdue").await
    }

    pub async fn cancel_invoice(
        &self,
        actor: &User,
        invoice_id: &InvoiceId,
    ) -> Result<Receipt<Invoice>, WorkflowError> {
        self.change_invoice_status(actor, invoice_id, InvoiceStatus::Cancelled, "cancel").await
    }

    pub async fn list_invoices(&self, actor: &User) -> Result<Vec<Invoice>, WorkflowError> {
        self.require(actor, Permission::FinanceViewInvoices).await?;
        Ok(self.ports.invoices.list().await?)
    }

    pub async fn invoice_stats(&self, actor: &User) -> Result<InvoiceStats, WorkflowError> {
        let invoices = self.list_invoices(actor).await?;
        Ok(InvoiceStats::from_invoices(&invoices))
    }

    // ---- users ----------------------------------------------------------

    /// Email match ignores case. Suspension is reported ahead of a bad
    /// password.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Receipt<User>, AuthError> {
        let users = self
            .ports
            .users
            .list()
            .await
            .map_err(|error| AuthError::Unavailable(error.to_string()))?;
        let user = users.into_iter().find(|user| user.email_matches(email));
        let Some(user) = user else {
            info!(event_name = "workflow.auth.rejected", reason = "unknown_email", "login refused");
            return Err(AuthError::UserNotFound);
        };
        if let Err(error) = user.verify_login(password) {
            info!(
                event_name = "workflow.auth.rejected",
                user_id = %user.id,
                reason = %error,
                "login refused"
            );
            return Err(error);
        }

        let mut delivery = Delivery::start();
        let event = delivery
            .event(AuditAction::UserLogin, &user)
            .with_detail("userId", user.id.0.clone())
            .with_detail("email", user.email.clone());
        self.record(&mut delivery, event).await;
        Ok(delivery.finish(user))
    }

    pub async fn list_users(&self, actor: &User) -> Result<Vec<User>, WorkflowError> {
        self.require(actor, Permission::AdminManageUsers).await?;
        Ok(self.ports.users.list().await?)
    }

    pub async fn create_user(
        &self,
        actor: &User,
        new_user: NewUser,
    ) -> Result<Receipt<User>, WorkflowError> {
        let actor = &self.require(actor, Permission::AdminManageUsers).await?;
        new_user.validate()?;
        let existing = self.ports.users.list().await?;
        if existing.iter().any(|user| user.email_matches(&new_user.email)) {
            return Err(WorkflowError::validation(format!(
                "a user with email `{}` already exists",
                new_user.email.trim()
            )));
        }

        let mut delivery = Delivery::start();
        let user = self.ports.users.create(new_user.into_user(today())).await?;
        let event = delivery
            .event(AuditAction::UserCreated, actor)
            .with_detail("userId", user.id.0.clone())
            .with_detail("email", user.email.clone())
            .with_detail("role", user.role.as_str());
        self.record(&mut delivery, event).await;
        Ok(delivery.finish(user))
    }

    async fn save_user(
        &self,
        before: &User,
        after: User,
        event: AuditEvent,
        mut delivery: Delivery,
    ) -> Result<Receipt<User>, WorkflowError> {
        let stored = self.ports.users.update(after, before.version).await?;
        self.record(&mut delivery, event).await;
        Ok(delivery.finish(stored))
    }

    pub async fn update_role(
        &self,
        actor: &User,
        user_id: &UserId,
        role: Role,
    ) -> Result<Receipt<User>, WorkflowError> {
        let actor = &self.require(actor, Permission::AdminManageUsers).await?;
        let user = self.load_user(user_id).await?;
        if user.role == role {
            return Err(WorkflowError::validation(format!("`{user_id}` already has role {role}")));
        }

        let mut next = user.clone();
        next.role = role;
        let delivery = Delivery::start();
        let event = delivery
            .event(AuditAction::UserRoleChanged, actor)
            .with_detail("userId", user.id.0.clone())
            .with_detail("oldRole", user.role.as_str())
            .with_detail("newRole", role.as_str());
        self.save_user(&user, next, event, delivery).await
    }

    pub async fn suspend_user(
        &self,
        actor: &User,
        user_id: &UserId,
    ) -> Result<Receipt<User>, WorkflowError> {
        let actor = &self.require(actor, Permission::AdminManageUsers).await?;
        if &actor.id == user_id {
            return Err(WorkflowError::validation("you cannot suspend your own account"));
        }
        self.set_user_status(actor, user_id, UserStatus::Suspended, AuditAction::UserSuspended)
            .await
    }

    pub async fn activate_user(
        &self,
        actor: &User,
        user_id: &UserId,
    ) -> Result<Receipt<User>, WorkflowError> {
        let actor = &self.require(actor, Permission::AdminManageUsers).await?;
        self.set_user_status(actor, user_id, UserStatus::Active, AuditAction::UserActivated).await
    }

    async fn set_user_status(
        &self,
        actor: &User,
        user_id: &UserId,
        status: UserStatus,
        action: AuditAction,
    ) -> Result<Receipt<User>, WorkflowError> {
        let user = self.load_user(user_id).await?;
        if user.status == status {
            return Err(WorkflowError::validation(format!(
                "`{user_id}` is already {}",
                if status == UserStatus::Active { "active" } else { "suspended" }
            )));
        }

        let mut next = user.clone();
        next.status = status;
        let delivery = Delivery::start();
        let event = delivery
            .event(action, actor)
            .with_detail("userId", user.id.0.clone())
            .with_detail("email", user.email.clone());
        self.save_user(&user, next, event, delivery).await
    }

    pub async fn reset_password(
        &self,
        actor: &User,
        user_id: &UserId,
        password: Password,
    ) -> Result<Receipt<User>, WorkflowError> {
        let actor = &self.require(actor, Permission::AdminManageUsers).await?;
        if password.is_blank() {
            return Err(WorkflowError::validation("password must not be blank"));
        }
        let user = self.load_user(user_id).await?;

        let mut next = user.clone();
        next.password = password;
        let delivery = Delivery::start();
        let event = delivery
            .event(AuditAction::PasswordReset, actor)
            .with_detail("userId", user.id.0.clone())
            .with_detail("email", user.email.clone());
        self.save_user(&user, next, event, delivery).await
    }

    // ---- audit log ------------------------------------------------------

    pub async fn audit_recent(
        &self,
        actor: &User,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, WorkflowError> {
        self.require(actor, Permission::AdminViewAudit).await?;
        self.ports.audit.recent(limit).await.map_err(|error| WorkflowError::Store(error.to_string()))
    }

    pub async fn audit_search(
        &self,
        actor: &User,
        query: &AuditQuery,
    ) -> Result<Vec<AuditEntry>, WorkflowError> {
        self.require(actor, Permission::AdminViewAudit).await?;
        self.ports.audit.search(query).await.map_err(|error| WorkflowError::Store(error.to_string()))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn transition_event(
    delivery: &Delivery,
    actor: &User,
    command: &RequestCommand,
    outcome: &TransitionOutcome,
    request: &Request,
    document: Option<&Document>,
) -> AuditEvent {
    let action = match outcome.action {
        RequestAction::Approve => AuditAction::RequestApproved,
        RequestAction::Reject => AuditAction::RequestRejected,
        RequestAction::Cancel => AuditAction::RequestCancelled,
        RequestAction::AddNote | RequestAction::RequestInfo => AuditAction::NoteAdded,
        RequestAction::AddQuote => AuditAction::QuoteAdded,
        RequestAction::SelectOption => AuditAction::OptionSelected,
        _ => AuditAction::StatusChanged,
    };

    let mut event = delivery
        .event(action, actor)
        .with_detail("requestId", request.id.0.clone())
        .with_detail("action", outcome.action.as_str())
        .with_detail("from", outcome.from.as_str())
        .with_detail("to", outcome.to.as_str());

    event = match command {
        RequestCommand::Reject { reason: Some(reason) }
        | RequestCommand::Cancel { reason: Some(reason) } => event.with_detail("reason", reason.trim()),
        RequestCommand::StartQuoting { vendor_id: Some(vendor_id) } => {
            event.with_detail("vendorId", vendor_id.0.clone())
        }
        RequestCommand::AddQuote { vendor, amount, .. } => {
            event.with_detail("vendor", vendor.trim()).with_detail("amount", amount.to_string())
        }
        RequestCommand::SelectOption { option_id } => {
            event.with_detail("optionId", option_id.to_string())
        }
        RequestCommand::AddNote { content } | RequestCommand::RequestInfo { content } => {
            event.with_detail("note", content.trim())
        }
        _ => event,
    };

    match document {
        Some(document) => event
            .with_detail("documentId", document.id.0.clone())
            .with_detail("fileName", document.file_name.clone()),
        None => event,
    }
}

/// Only hand-offs back to the requester notify.
fn transition_notification(command: &RequestCommand, request: &Request) -> Option<NotificationPayload> {
    match command {
        RequestCommand::Approve => Some(NotificationPayload::approved(request)),
        RequestCommand::Reject { reason } => {
            Some(NotificationPayload::rejected(request, reason.as_deref()))
        }
        RequestCommand::ConfirmBooking => {
            Some(NotificationPayload::status_updated(request, RequestStatus::Booked))
        }
        RequestCommand::RequestInfo { content } => {
            Some(NotificationPayload::info_requested(request, content))
        }
        _ => None,
    }
}
