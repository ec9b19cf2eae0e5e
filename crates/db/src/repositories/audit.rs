use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use tripdesk_core::audit::{AuditAction, AuditEntry, AuditError, AuditEvent, AuditQuery, AuditSink};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlAuditSink {
    pool: DbPool,
}

impl SqlAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, event: AuditEvent) -> Result<AuditEntry, RepositoryError> {
        let details = serde_json::to_string(&event.details)?;
        let result = sqlx::query(
            "INSERT INTO audit_log (action, actor, correlation_id, timestamp, details)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.action.as_str())
        .bind(&event.actor)
        .bind(&event.correlation_id)
        .bind(event.occurred_at.to_rfc3339())
        .bind(details)
        .execute(&self.pool)
        .await?;

        let id = u64::try_from(result.last_insert_rowid())
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(AuditEntry::from_event(id, event))
    }

    async fn newest_first(&self, limit: Option<usize>) -> Result<Vec<AuditEntry>, RepositoryError> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.and_then(|limit| i64::try_from(limit).ok()).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT id, action, actor, correlation_id, timestamp, details
             FROM audit_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEntry, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action: String = row.try_get("action").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor: String = row.try_get("actor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let correlation_id: String =
        row.try_get("correlation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let timestamp: String =
        row.try_get("timestamp").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let details: String =
        row.try_get("details").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let action = AuditAction::parse(&action)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown audit action `{action}`")))?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let details: BTreeMap<String, String> = serde_json::from_str(&details)?;

    Ok(AuditEntry {
        id: u64::try_from(id).map_err(|e| RepositoryError::Decode(e.to_string()))?,
        action,
        actor,
        correlation_id,
        timestamp,
        details,
    })
}

fn unavailable(error: RepositoryError) -> AuditError {
    AuditError::Unavailable(error.to_string())
}

#[async_trait]
impl AuditSink for SqlAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<AuditEntry, AuditError> {
        self.insert(event).await.map_err(unavailable)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        self.newest_first(Some(limit)).await.map_err(unavailable)
    }

    async fn search(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.newest_first(None).await.map_err(unavailable)?;
        Ok(entries.into_iter().filter(|entry| query.matches(entry)).collect())
    }
}
