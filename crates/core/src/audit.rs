use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    RequestCreated,
    RequestUpdated,
    RequestApproved,
    RequestRejected,
    RequestCancelled,
    StatusChanged,
    NoteAdded,
    QuoteAdded,
    OptionSelected,
    DocumentUploaded,
    DocumentDeleted,
    InvoiceForwarded,
    InvoiceCreated,
    InvoiceUpdated,
    InvoiceStatusChanged,
    UserCreated,
    UserRoleChanged,
    UserSuspended,
    UserActivated,
    PasswordReset,
    UserLogin,
}

impl AuditAction {
    pub const ALL: [AuditAction; 21] = [
        AuditAction::RequestCreated,
        AuditAction::RequestUpdated,
        AuditAction::RequestApproved,
        AuditAction::RequestRejected,
        AuditAction::RequestCancelled,
        AuditAction::StatusChanged,
        AuditAction::NoteAdded,
        AuditAction::QuoteAdded,
        AuditAction::OptionSelected,
        AuditAction::DocumentUploaded,
        AuditAction::DocumentDeleted,
        AuditAction::InvoiceForwarded,
        AuditAction::InvoiceCreated,
        AuditAction::InvoiceUpdated,
        AuditAction::InvoiceStatusChanged,
        AuditAction::UserCreated,
        AuditAction::UserRoleChanged,
        AuditAction::UserSuspended,
        AuditAction::UserActivated,
        AuditAction::PasswordReset,
        AuditAction::UserLogin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestCreated => "REQUEST_CREATED",
            Self::RequestUpdated => "REQUEST_UPDATED",
            Self::RequestApproved => "REQUEST_APPROVED",
            Self::RequestRejected => "REQUEST_REJECTED",
            Self::RequestCancelled => "REQUEST_CANCELLED",
            Self::StatusChanged => "STATUS_CHANGED",
            Self::NoteAdded => "NOTE_ADDED",
            Self::QuoteAdded => "QUOTE_ADDED",
            Self::OptionSelected => "OPTION_SELECTED",
            Self::DocumentUploaded => "DOCUMENT_UPLOADED",
            Self::DocumentDeleted => "DOCUMENT_DELETED",
            Self::InvoiceForwarded => "INVOICE_FORWARDED",
            Self::InvoiceCreated => "INVOICE_CREATED",
            Self::InvoiceUpdated => "INVOICE_UPDATED",
            Self::InvoiceStatusChanged => "INVOICE_STATUS_CHANGED",
            Self::UserCreated => "USER_CREATED",
            Self::UserRoleChanged => "USER_ROLE_CHANGED",
            Self::UserSuspended => "USER_SUSPENDED",
            Self::UserActivated => "USER_ACTIVATED",
            Self::PasswordReset => "PASSWORD_RESET",
            Self::UserLogin => "USER_LOGIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|action| action.as_str() == key)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit record before the sink has numbered it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor: String,
    pub correlation_id: String,
    pub details: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        actor: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            action,
            actor: actor.into(),
            correlation_id: correlation_id.into(),
            details: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub action: AuditAction,
    pub actor: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub details: BTreeMap<String, String>,
}

impl AuditEntry {
    pub fn from_event(id: u64, event: AuditEvent) -> Self {
        Self {
            id,
            action: event.action,
            actor: event.actor,
            correlation_id: event.correlation_id,
            timestamp: event.occurred_at,
            details: event.details,
        }
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

/// Filter for audit log searches. Empty fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub text: Option<String>,
    pub action: Option<AuditAction>,
    pub actor: Option<String>,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if self.action.is_some_and(|action| action != entry.action) {
            return false;
        }
        if let Some(actor) = &self.actor {
            if !entry.actor.eq_ignore_ascii_case(actor.trim()) {
                return false;
            }
        }
        let Some(text) = self.text.as_deref().map(str::trim).filter(|text| !text.is_empty())
        else {
            return true;
        };
        let needle = text.to_lowercase();
        entry.actor.to_lowercase().contains(&needle)
            || entry.action.as_str().to_lowercase().contains(&needle)
            || entry.details.values().any(|value| value.to_lowercase().contains(&needle))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Append-only audit trail. Ids are assigned by the sink and increase
/// monotonically; reads come back newest-first.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<AuditEntry, AuditError>;
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError>;
    async fn search(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError>;
}

#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    /// Snapshot in append order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, event: AuditEvent) -> AuditEntry {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = entries.last().map_or(1, |last| last.id + 1);
        let entry = AuditEntry::from_event(id, event);
        entries.push(entry.clone());
        entry
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<AuditEntry, AuditError> {
        Ok(self.push(event))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.entries().into_iter().rev().take(limit).collect())
    }

    async fn search(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.entries().into_iter().rev().filter(|entry| query.matches(entry)).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditAction, AuditEvent, AuditQuery, AuditSink, InMemoryAuditLog};

    #[tokio::test]
    async fn in_memory_log_numbers_entries_and_reads_newest_first() {
        let log = InMemoryAuditLog::default();
        for action in ["triage", "send_for_approval", "reject"] {
            log.append(
                AuditEvent::new(AuditAction::StatusChanged, "Glenda", "corr-1")
                    .with_detail("requestId", "REQ-2026-001")
                    .with_detail("action", action),
            )
            .await
            .expect("append");
        }

        let ids: Vec<_> = log.entries().iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let recent = log.recent(2).await.expect("recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].detail("action"), Some("reject"));
        assert_eq!(recent[1].detail("action"), Some("send_for_approval"));
    }

    #[tokio::test]
    async fn search_filters_by_action_actor_and_text() {
        let log = InMemoryAuditLog::default();
        log.append(
            AuditEvent::new(AuditAction::UserLogin, "Sarah", "corr-1").with_detail("email", "sarah@example.org"),
        )
        .await
        .expect("append");
        log.append(
            AuditEvent::new(AuditAction::RequestApproved, "David", "corr-2")
                .with_detail("requestId", "REQ-2026-004"),
        )
        .await
        .expect("append");

        let approved = log
            .search(&AuditQuery { action: Some(AuditAction::RequestApproved), ..AuditQuery::default() })
            .await
            .expect("search");
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].actor, "David");

        let by_actor = log
            .search(&AuditQuery { actor: Some("sarah".to_string()), ..AuditQuery::default() })
            .await
            .expect("search");
        assert_eq!(by_actor.len(), 1);

        let by_text = log
            .search(&AuditQuery { text: Some("req-2026-004".to_string()), ..AuditQuery::default() })
            .await
            .expect("search");
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].action, AuditAction::RequestApproved);

        let everything = log.search(&AuditQuery::default()).await.expect("search");
        assert_eq!(everything.len(), 2);
        assert_eq!(everything[0].id, 2);
    }

    #[test]
    fn action_tokens_parse_back() {
        for action in AuditAction::ALL {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("approval_granted"), None);
    }
}
