use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::{User, UserId};
use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Submitted,
    Triage,
    AwaitingApproval,
    Approved,
    Rejected,
    Quoting,
    OptionReview,
    Booked,
    ItinerarySent,
    Invoiced,
    Reconciled,
    Closed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 13] = [
        RequestStatus::Submitted,
        RequestStatus::Triage,
        RequestStatus::AwaitingApproval,
        RequestStatus::Approved,
        RequestStatus::Rejected,
        RequestStatus::Quoting,
        RequestStatus::OptionReview,
        RequestStatus::Booked,
        RequestStatus::ItinerarySent,
        RequestStatus::Invoiced,
        RequestStatus::Reconciled,
        RequestStatus::Closed,
        RequestStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Triage => "TRIAGE",
            Self::AwaitingApproval => "AWAITING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Quoting => "QUOTING",
            Self::OptionReview => "OPTION_REVIEW",
            Self::Booked => "BOOKED",
            Self::ItinerarySent => "ITINERARY_SENT",
            Self::Invoiced => "INVOICED",
            Self::Reconciled => "RECONCILED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|status| status.as_str() == key)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Reconciled | Self::Closed | Self::Cancelled)
    }

    /// Statuses in which the requester may still reshape their own request.
    pub fn is_requester_editable(&self) -> bool {
        matches!(self, Self::Submitted | Self::Triage)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::Triage => "Under Triage",
            Self::AwaitingApproval => "Awaiting Approval",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Quoting => "Quoting in Progress",
            Self::OptionReview => "Option Review",
            Self::Booked => "Booked",
            Self::ItinerarySent => "Itinerary Sent",
            Self::Invoiced => "Invoiced",
            Self::Reconciled => "Reconciled",
            Self::Closed => "Closed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Travel,
    Catering,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Travel => "TRAVEL",
            Self::Catering => "CATERING",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TravelDetails {
    pub origin: String,
    pub destination: String,
    pub departure: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub travellers: u32,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub cost_centre: String,
    #[serde(default)]
    pub preferences: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CateringDetails {
    pub event_date: NaiveDate,
    #[serde(default)]
    pub event_time: Option<String>,
    pub location: String,
    pub attendees: u32,
    #[serde(default)]
    pub meal_types: Vec<String>,
    #[serde(default)]
    pub dietary: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub cost_centre: String,
}

/// Type-specific request fields; the variant decides which fields exist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestDetails {
    Travel(TravelDetails),
    Catering(CateringDetails),
}

impl RequestDetails {
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::Travel(_) => RequestType::Travel,
            Self::Catering(_) => RequestType::Catering,
        }
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        match self {
            Self::Travel(travel) => {
                if travel.destination.trim().is_empty() {
                    return Err(WorkflowError::Validation(
                        "travel destination is required".to_string(),
                    ));
                }
                if travel.travellers == 0 {
                    return Err(WorkflowError::Validation(
                        "travellers must be at least 1".to_string(),
                    ));
                }
                if let Some(return_date) = travel.return_date {
                    if return_date < travel.departure {
                        return Err(WorkflowError::Validation(
                            "return date must not precede departure".to_string(),
                        ));
                    }
                }
            }
            Self::Catering(catering) => {
                if catering.location.trim().is_empty() {
                    return Err(WorkflowError::Validation(
                        "catering location is required".to_string(),
                    ));
                }
                if catering.attendees == 0 {
                    return Err(WorkflowError::Validation(
                        "attendees must be at least 1".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    Note,
    InfoRequest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: u32,
    pub author: String,
    pub content: String,
    pub kind: NoteKind,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteOption {
    pub id: u32,
    pub vendor: String,
    pub description: String,
    pub amount: Decimal,
    pub added_by: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub title: String,
    pub status: RequestStatus,
    pub details: RequestDetails,
    pub requester: String,
    pub requester_id: UserId,
    pub requester_email: String,
    pub estimate: Decimal,
    pub created: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub assigned_vendor: Option<UserId>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub quote_options: Vec<QuoteOption>,
    #[serde(default)]
    pub selected_option: Option<u32>,
    #[serde(default)]
    pub version: u64,
}

impl Request {
    pub fn request_type(&self) -> RequestType {
        self.details.request_type()
    }

    /// Ownership is a stable id match, with the display name as the fallback
    /// key older records were written with.
    pub fn is_requested_by(&self, user: &User) -> bool {
        self.requester_id == user.id || (!user.name.is_empty() && self.requester == user.name)
    }

    pub fn is_assigned_to(&self, user: &User) -> bool {
        self.assigned_vendor.as_ref() == Some(&user.id)
    }

    /// Notes are kept newest-first.
    pub fn push_note(&mut self, author: &str, content: &str, kind: NoteKind, at: DateTime<Utc>) {
        let id = self.notes.iter().map(|note| note.id).max().unwrap_or(0) + 1;
        self.notes.insert(
            0,
            Note {
                id,
                author: author.to_string(),
                content: content.trim().to_string(),
                kind,
                created: at,
            },
        );
    }

    pub fn push_quote_option(&mut self, vendor: &str, description: &str, amount: Decimal, by: &str) -> u32 {
        let id = self.quote_options.iter().map(|option| option.id).max().unwrap_or(0) + 1;
        self.quote_options.push(QuoteOption {
            id,
            vendor: vendor.trim().to_string(),
            description: description.trim().to_string(),
            amount,
            added_by: by.to_string(),
        });
        id
    }

    pub fn quote_option(&self, option_id: u32) -> Option<&QuoteOption> {
        self.quote_options.iter().find(|option| option.id == option_id)
    }
}

/// Everything a requester supplies on submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub title: String,
    pub details: RequestDetails,
    pub estimate: Decimal,
}

impl RequestDraft {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.title.trim().is_empty() {
            return Err(WorkflowError::Validation("request title is required".to_string()));
        }
        if self.estimate < Decimal::ZERO {
            return Err(WorkflowError::Validation("estimate must not be negative".to_string()));
        }
        self.details.validate()
    }

    pub fn into_request(self, requester: &User, now: DateTime<Utc>) -> Request {
        Request {
            id: RequestId(String::new()),
            title: self.title.trim().to_string(),
            status: RequestStatus::Submitted,
            details: self.details,
            requester: requester.name.clone(),
            requester_id: requester.id.clone(),
            requester_email: requester.email.clone(),
            estimate: self.estimate,
            created: now,
            updated_at: now,
            assigned_vendor: None,
            notes: Vec::new(),
            quote_options: Vec::new(),
            selected_option: None,
            version: 0,
        }
    }
}

/// Fields an editor may change while the request is still editable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestEdit {
    pub title: Option<String>,
    pub details: Option<RequestDetails>,
    pub estimate: Option<Decimal>,
}

impl RequestEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.details.is_none() && self.estimate.is_none()
    }

    pub fn apply_to(self, request: &mut Request) -> Result<Vec<&'static str>, WorkflowError> {
        let mut changed = Vec::new();
        if let Some(title) = self.title {
            if title.trim().is_empty() {
                return Err(WorkflowError::Validation("request title is required".to_string()));
            }
            request.title = title.trim().to_string();
            changed.push("title");
        }
        if let Some(details) = self.details {
            details.validate()?;
            if details.request_type() != request.request_type() {
                return Err(WorkflowError::Validation(
                    "request type cannot be changed after submission".to_string(),
                ));
            }
            request.details = details;
            changed.push("details");
        }
        if let Some(estimate) = self.estimate {
            if estimate < Decimal::ZERO {
                return Err(WorkflowError::Validation(
                    "estimate must not be negative".to_string(),
                ));
            }
            request.estimate = estimate;
            changed.push("estimate");
        }
        Ok(changed)
    }
}
