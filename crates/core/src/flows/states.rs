use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::document::DocumentUpload;
use crate::domain::request::RequestStatus;
use crate::domain::user::UserId;
use crate::rbac::Permission;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    Triage,
    SendForApproval,
    RequestInfo,
    Approve,
    Reject,
    StartQuoting,
    AddQuote,
    SendOptions,
    SelectOption,
    ConfirmBooking,
    UploadItinerary,
    UploadInvoice,
    ForwardToFinance,
    Reconcile,
    Close,
    Cancel,
    AddNote,
    Edit,
    UploadDocument,
}

impl RequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::SendForApproval => "send_for_approval",
            Self::RequestInfo => "request_info",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::StartQuoting => "start_quoting",
            Self::AddQuote => "add_quote",
            Self::SendOptions => "send_options",
            Self::SelectOption => "select_option",
            Self::ConfirmBooking => "confirm_booking",
            Self::UploadItinerary => "upload_itinerary",
            Self::UploadInvoice => "upload_invoice",
            Self::ForwardToFinance => "forward_to_finance",
            Self::Reconcile => "reconcile",
            Self::Close => "close",
            Self::Cancel => "cancel",
            Self::AddNote => "add_note",
            Self::Edit => "edit",
            Self::UploadDocument => "upload_document",
        }
    }
}

impl fmt::Display for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may fire a table row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorRule {
    Holds(Permission),
    /// The request's own requester, holding the permission.
    Requester(Permission),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: RequestStatus,
    pub action: RequestAction,
    /// `None` for actions that leave the status where it is.
    pub to: Option<RequestStatus>,
    pub actor: ActorRule,
}

/// An action together with the payload it needs.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestCommand {
    Triage,
    SendForApproval,
    RequestInfo { content: String },
    Approve,
    Reject { reason: Option<String> },
    StartQuoting { vendor_id: Option<UserId> },
    AddQuote { vendor: String, description: String, amount: Decimal },
    SendOptions,
    SelectOption { option_id: u32 },
    ConfirmBooking,
    UploadItinerary(DocumentUpload),
    UploadInvoice(DocumentUpload),
    Reconcile,
    Close,
    Cancel { reason: Option<String> },
    AddNote { content: String },
}

impl RequestCommand {
    pub fn action(&self) -> RequestAction {
        match self {
            Self::Triage => RequestAction::Triage,
            Self::SendForApproval => RequestAction::SendForApproval,
            Self::RequestInfo { .. } => RequestAction::RequestInfo,
            Self::Approve => RequestAction::Approve,
            Self::Reject { .. } => RequestAction::Reject,
            Self::StartQuoting { .. } => RequestAction::StartQuoting,
            Self::AddQuote { .. } => RequestAction::AddQuote,
            Self::SendOptions => RequestAction::SendOptions,
            Self::SelectOption { .. } => RequestAction::SelectOption,
            Self::ConfirmBooking => RequestAction::ConfirmBooking,
            Self::UploadItinerary(_) => RequestAction::UploadItinerary,
            Self::UploadInvoice(_) => RequestAction::UploadInvoice,
            Self::Reconcile => RequestAction::Reconcile,
            Self::Close => RequestAction::Close,
            Self::Cancel { .. } => RequestAction::Cancel,
            Self::AddNote { .. } => RequestAction::AddNote,
        }
    }

    pub fn upload(&self) -> Option<&DocumentUpload> {
        match self {
            Self::UploadItinerary(upload) | Self::UploadInvoice(upload) => Some(upload),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub action: RequestAction,
}

impl TransitionOutcome {
    pub fn status_changed(&self) -> bool {
        self.from != self.to
    }
}
