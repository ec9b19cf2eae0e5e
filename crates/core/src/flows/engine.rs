use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::authz::can_access_request;
use crate::domain::request::{NoteKind, Request, RequestStatus};
use crate::domain::user::User;
use crate::errors::WorkflowError;
use crate::flows::states::{
    ActorRule, RequestAction, RequestCommand, TransitionOutcome, TransitionRule,
};
use crate::rbac::{has_permission, Permission};

use ActorRule::{Holds, Requester};
use Permission::*;
use RequestAction as A;
use RequestStatus as S;

const fn row(
    from: RequestStatus,
    action: RequestAction,
    to: Option<RequestStatus>,
    actor: ActorRule,
) -> TransitionRule {
    TransitionRule { from, action, to, actor }
}

const fn cancel_any(from: RequestStatus) -> TransitionRule {
    row(
        from,
        RequestAction::Cancel,
        Some(RequestStatus::Cancelled),
        ActorRule::Holds(Permission::RequestCancelAll),
    )
}

/// The single source of truth for request status movement. Row order is the
/// order actions are offered in.
pub static TRANSITIONS: &[TransitionRule] = &[
    row(S::Submitted, A::Triage, Some(S::Triage), Holds(WorkflowTriage)),
    row(S::Submitted, A::AddNote, None, Holds(WorkflowTriage)),
    row(S::Submitted, A::Edit, None, Requester(RequestEditOwn)),
    row(S::Submitted, A::Cancel, Some(S::Cancelled), Requester(RequestCancelOwn)),
    cancel_any(S::Submitted),
    row(S::Triage, A::SendForApproval, Some(S::AwaitingApproval), Holds(WorkflowTriage)),
    row(S::Triage, A::RequestInfo, None, Holds(WorkflowTriage)),
    row(S::Triage, A::Edit, None, Requester(RequestEditOwn)),
    cancel_any(S::Triage),
    row(S::AwaitingApproval, A::Approve, Some(S::Approved), Holds(WorkflowApprove)),
    row(S::AwaitingApproval, A::Reject, Some(S::Rejected), Holds(WorkflowReject)),
    row(S::AwaitingApproval, A::AddNote, None, Holds(WorkflowApprove)),
    cancel_any(S::AwaitingApproval),
    row(S::Approved, A::StartQuoting, Some(S::Quoting), Holds(WorkflowAssignVendor)),
    row(S::Approved, A::AddNote, None, Holds(WorkflowAssignVendor)),
    cancel_any(S::Approved),
    row(S::Quoting, A::AddQuote, None, Holds(WorkflowQuote)),
    row(S::Quoting, A::SendOptions, Some(S::OptionReview), Holds(WorkflowQuote)),
    cancel_any(S::Quoting),
    row(S::OptionReview, A::SelectOption, None, Requester(RequestViewOwn)),
    row(S::OptionReview, A::ConfirmBooking, Some(S::Booked), Holds(WorkflowBook)),
    cancel_any(S::OptionReview),
    row(S::Booked, A::UploadItinerary, Some(S::ItinerarySent), Holds(WorkflowBook)),
    row(S::Booked, A::AddNote, None, Holds(WorkflowBook)),
    cancel_any(S::Booked),
    row(S::ItinerarySent, A::UploadInvoice, Some(S::Invoiced), Holds(WorkflowBook)),
    row(S::ItinerarySent, A::AddNote, None, Holds(WorkflowBook)),
    cancel_any(S::ItinerarySent),
    row(S::Invoiced, A::ForwardToFinance, None, Holds(DocumentForwardFinance)),
    row(S::Invoiced, A::Reconcile, Some(S::Reconciled), Holds(FinanceReconcile)),
    row(S::Invoiced, A::Close, Some(S::Closed), Holds(WorkflowBook)),
    cancel_any(S::Invoiced),
];

pub fn rules_for(status: RequestStatus) -> impl Iterator<Item = &'static TransitionRule> {
    TRANSITIONS.iter().filter(move |rule| rule.from == status)
}

pub fn actor_rule_holds(rule: ActorRule, user: &User, request: &Request) -> bool {
    match rule {
        ActorRule::Holds(permission) => has_permission(Some(user), permission),
        ActorRule::Requester(permission) => {
            request.is_requested_by(user) && has_permission(Some(user), permission)
        }
    }
}

/// Result of a legal transition: the updated request and what moved.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub request: Request,
    pub outcome: TransitionOutcome,
}

#[derive(Clone, Debug, Default)]
pub struct RequestLifecycle;

impl RequestLifecycle {
    pub fn new() -> Self {
        Self
    }

    /// Resolves the row the user would fire. Missing row beats missing
    /// authority so a stale client sees `InvalidTransition`.
    pub fn authorize(
        &self,
        user: Option<&User>,
        request: &Request,
        action: RequestAction,
    ) -> Result<&'static TransitionRule, WorkflowError> {
        let mut candidates = rules_for(request.status).filter(|rule| rule.action == action).peekable();
        if candidates.peek().is_none() {
            return Err(WorkflowError::invalid_transition(request.status, action));
        }
        let Some(user) = user else {
            return Err(WorkflowError::Unauthorized);
        };
        if !can_access_request(Some(user), Some(request)) {
            return Err(WorkflowError::Unauthorized);
        }
        candidates
            .find(|rule| actor_rule_holds(rule.actor, user, request))
            .ok_or(WorkflowError::Unauthorized)
    }

    /// Validates and applies `command` to a copy of `request`. The caller
    /// persists the copy with a version check.
    pub fn apply(
        &self,
        user: Option<&User>,
        request: &Request,
        command: &RequestCommand,
        expected_status: Option<RequestStatus>,
        now: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        let action = command.action();
        let rule = self.authorize(user, request, action)?;
        if let Some(expected) = expected_status {
            if expected != request.status {
                return Err(WorkflowError::StaleState {
                    entity_id: request.id.0.clone(),
                    expected: expected.to_string(),
                    found: request.status.to_string(),
                });
            }
        }
        let author = user.map(|user| user.name.as_str()).unwrap_or_default();

        let mut next = request.clone();
        apply_payload(&mut next, command, author, now)?;
        if let Some(to) = rule.to {
            next.status = to;
        }
        next.updated_at = now;

        let outcome = TransitionOutcome { from: request.status, to: next.status, action };
        Ok(Transition { request: next, outcome })
    }
}

fn non_empty(content: &str, what: &str) -> Result<(), WorkflowError> {
    if content.trim().is_empty() {
        return Err(WorkflowError::validation(format!("{what} must not be empty")));
    }
    Ok(())
}

fn apply_payload(
    request: &mut Request,
    command: &RequestCommand,
    author: &str,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    match command {
        RequestCommand::AddNote { content } => {
            non_empty(content, "note")?;
            request.push_note(author, content, NoteKind::Note, now);
        }
        RequestCommand::RequestInfo { content } => {
            non_empty(content, "information request")?;
            request.push_note(author, content, NoteKind::InfoRequest, now);
        }
        RequestCommand::StartQuoting { vendor_id } => {
            let Some(vendor_id) = vendor_id else {
                return Err(WorkflowError::validation("a vendor must be assigned to start quoting"));
            };
            request.assigned_vendor = Some(vendor_id.clone());
        }
        RequestCommand::AddQuote { vendor, description, amount } => {
            non_empty(vendor, "quote vendor")?;
            if *amount <= Decimal::ZERO {
                return Err(WorkflowError::validation("quote amount must be positive"));
            }
            request.push_quote_option(vendor, description, *amount, author);
        }
        RequestCommand::SendOptions => {
            if request.quote_options.is_empty() {
                return Err(WorkflowError::validation(
                    "at least one quote option is needed before review",
                ));
            }
        }
        RequestCommand::SelectOption { option_id } => {
            if request.quote_option(*option_id).is_none() {
                return Err(WorkflowError::validation(format!(
                    "quote option {option_id} does not exist"
                )));
            }
            request.selected_option = Some(*option_id);
        }
        RequestCommand::UploadItinerary(upload) | RequestCommand::UploadInvoice(upload) => {
            upload.validate()?;
        }
        RequestCommand::Triage
        | RequestCommand::SendForApproval
        | RequestCommand::Approve
        | RequestCommand::Reject { .. }
        | RequestCommand::ConfirmBooking
        | RequestCommand::Reconcile
        | RequestCommand::Close
        | RequestCommand::Cancel { .. } => {}
    }
    Ok(())
}
