use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::request::{Request, RequestStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Action,
    Approval,
    Update,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_entity_id: Option<String>,
}

impl NotificationPayload {
    pub fn new_submission(request: &Request) -> Self {
        Self {
            kind: NotificationKind::Action,
            title: "New Request Submitted".to_string(),
            message: format!("{} submitted {}: {}", request.requester, request.id, request.title),
            related_entity_id: Some(request.id.0.clone()),
        }
    }

    pub fn approved(request: &Request) -> Self {
        Self {
            kind: NotificationKind::Approval,
            title: "Request Approved".to_string(),
            message: format!("Your request {} has been approved.", request.id),
            related_entity_id: Some(request.id.0.clone()),
        }
    }

    pub fn rejected(request: &Request, reason: Option<&str>) -> Self {
        let message = match reason.map(str::trim).filter(|reason| !reason.is_empty()) {
            Some(reason) => format!("Your request {} was rejected. Reason: {reason}", request.id),
            None => format!("Your request {} was rejected.", request.id),
        };
        Self {
            kind: NotificationKind::Approval,
            title: "Request Rejected".to_string(),
            message,
            related_entity_id: Some(request.id.0.clone()),
        }
    }

    pub fn status_updated(request: &Request, status: RequestStatus) -> Self {
        Self {
            kind: NotificationKind::Update,
            title: "Request Status Updated".to_string(),
            message: format!("Your request {} is now {}.", request.id, status.label()),
            related_entity_id: Some(request.id.0.clone()),
        }
    }

    pub fn info_requested(request: &Request, question: &str) -> Self {
        Self {
            kind: NotificationKind::Action,
            title: "Information Requested".to_string(),
            message: format!("More information is needed for {}: {}", request.id, question.trim()),
            related_entity_id: Some(request.id.0.clone()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification channel. `recipient` is a user id.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, payload: NotificationPayload) -> Result<(), NotifyError>;
}

/// Accepts and drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _recipient: &str, _payload: NotificationPayload) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient: String,
    #[serde(flatten)]
    pub payload: NotificationPayload,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-recipient inboxes, newest first.
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    inboxes: Arc<RwLock<HashMap<String, Vec<Notification>>>>,
}

impl InMemoryNotifier {
    pub async fn inbox(&self, recipient: &str) -> Vec<Notification> {
        self.inboxes.read().await.get(recipient).cloned().unwrap_or_default()
    }

    pub async fn unread_count(&self, recipient: &str) -> usize {
        self.inboxes
            .read()
            .await
            .get(recipient)
            .map_or(0, |inbox| inbox.iter().filter(|notification| !notification.read).count())
    }

    /// Total notifications across every inbox.
    pub async fn sent_count(&self) -> usize {
        self.inboxes.read().await.values().map(Vec::len).sum()
    }

    pub async fn mark_read(&self, recipient: &str, notification_id: &str) -> bool {
        let mut inboxes = self.inboxes.write().await;
        let Some(notification) = inboxes
            .get_mut(recipient)
            .and_then(|inbox| inbox.iter_mut().find(|notification| notification.id == notification_id))
        else {
            return false;
        };
        notification.read = true;
        true
    }

    pub async fn mark_all_read(&self, recipient: &str) {
        if let Some(inbox) = self.inboxes.write().await.get_mut(recipient) {
            inbox.iter_mut().for_each(|notification| notification.read = true);
        }
    }

    pub async fn clear(&self, recipient: &str) {
        self.inboxes.write().await.remove(recipient);
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, recipient: &str, payload: NotificationPayload) -> Result<(), NotifyError> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            recipient: recipient.to_string(),
            payload,
            read: false,
            created_at: Utc::now(),
        };
        self.inboxes.write().await.entry(recipient.to_string()).or_default().insert(0, notification);
        Ok(())
    }
}
