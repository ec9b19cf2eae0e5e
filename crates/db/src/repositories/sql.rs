use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tokio::sync::broadcast;
use tracing::debug;

use tripdesk_core::ports::{Store, StoreChange, StoreError};

use super::{scope_key, RepositoryError, Table};
use crate::DbPool;

const CHANGE_FEED_CAPACITY: usize = 256;

/// SQLite-backed versioned store. One table per entity kind, see `Table`.
///
/// The change feed only reports writes made through this instance.
pub struct SqlStore<E: Table> {
    pool: DbPool,
    changes: broadcast::Sender<StoreChange<E>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Table> SqlStore<E> {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes, _entity: PhantomData }
    }

    fn publish(&self, change: StoreChange<E>) {
        let _ = self.changes.send(change);
    }

    fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<E, RepositoryError> {
        let body: String = row.try_get("body").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let version: i64 =
            row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let mut entity: E = serde_json::from_str(&body)?;
        // The column wins over whatever version the body recorded.
        entity.set_version(u64::try_from(version).map_err(|e| RepositoryError::Decode(e.to_string()))?);
        Ok(entity)
    }

    async fn insert(&self, mut entity: E) -> Result<E, RepositoryError> {
        let scope = entity.id_scope();
        let key = scope_key(scope);
        let mut tx = self.pool.begin().await?;

        let last: i64 = sqlx::query(
            "SELECT COALESCE(MAX(last), 0) AS last FROM id_sequences WHERE entity = ? AND scope = ?",
        )
        .bind(E::TABLE)
        .bind(&key)
        .fetch_one(&mut *tx)
        .await?
        .try_get("last")?;
        let sequence = scope.sequence_of(entity.id()).map_or(last + 1, i64::from);
        sqlx::query(
            "INSERT INTO id_sequences (entity, scope, last) VALUES (?, ?, ?)
             ON CONFLICT (entity, scope) DO UPDATE SET last = MAX(last, excluded.last)",
        )
        .bind(E::TABLE)
        .bind(&key)
        .bind(sequence)
        .execute(&mut *tx)
        .await?;

        if entity.id().is_empty() {
            let sequence = u32::try_from(sequence).map_err(|e| RepositoryError::Decode(e.to_string()))?;
            entity.assign_id(scope.format(sequence));
        }
        entity.set_version(1);

        sqlx::query(&format!(
            "INSERT INTO {} (id, scope, sequence, status, version, body, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            E::TABLE
        ))
        .bind(entity.id())
        .bind(&key)
        .bind(sequence)
        .bind(entity.status_label())
        .bind(1_i64)
        .bind(serde_json::to_string(&entity)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(event_name = "db.store.created", table = E::TABLE, id = %entity.id(), "row inserted");
        Ok(entity)
    }

    async fn swap(&self, mut entity: E, expected_version: u64) -> Result<E, RepositoryError> {
        let next_version = expected_version + 1;
        entity.set_version(next_version);
        let expected = i64::try_from(expected_version).map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let next = i64::try_from(next_version).map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(&format!(
            "UPDATE {} SET status = ?, version = ?, body = ?, updated_at = ?
             WHERE id = ? AND version = ?",
            E::TABLE
        ))
        .bind(entity.status_label())
        .bind(next)
        .bind(serde_json::to_string(&entity)?)
        .bind(Utc::now().to_rfc3339())
        .bind(entity.id())
        .bind(expected)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let current = sqlx::query(&format!("SELECT version FROM {} WHERE id = ?", E::TABLE))
                .bind(entity.id())
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Err(match current {
                Some(row) => RepositoryError::Conflict {
                    id: entity.id().to_string(),
                    expected: expected_version,
                    actual: u64::try_from(row.try_get::<i64, _>("version")?).unwrap_or_default(),
                },
                None => RepositoryError::Missing { entity: E::KIND, id: entity.id().to_string() },
            });
        }
        tx.commit().await?;
        Ok(entity)
    }

    async fn fetch(&self, id: &str) -> Result<Option<E>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT body, version FROM {} WHERE id = ?", E::TABLE))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn fetch_all(&self) -> Result<Vec<E>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT body, version FROM {} ORDER BY rowid", E::TABLE))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn delete(&self, id: &str) -> Result<E, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!("SELECT body, version FROM {} WHERE id = ?", E::TABLE))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(RepositoryError::Missing { entity: E::KIND, id: id.to_string() });
        };
        let removed = Self::decode(&row)?;
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", E::TABLE))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(removed)
    }
}

#[async_trait]
impl<E: Table> Store<E> for SqlStore<E> {
    async fn create(&self, entity: E) -> Result<E, StoreError> {
        let created = self.insert(entity).await?;
        self.publish(StoreChange::Created(created.clone()));
        Ok(created)
    }

    async fn update(&self, entity: E, expected_version: u64) -> Result<E, StoreError> {
        let updated = self.swap(entity, expected_version).await?;
        self.publish(StoreChange::Updated(updated.clone()));
        Ok(updated)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<E>, StoreError> {
        Ok(self.fetch(id).await?)
    }

    async fn list(&self) -> Result<Vec<E>, StoreError> {
        Ok(self.fetch_all().await?)
    }

    async fn remove(&self, id: &str) -> Result<E, StoreError> {
        let removed = self.delete(id).await?;
        self.publish(StoreChange::Removed(removed.clone()));
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange<E>> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use tripdesk_core::domain::user::{Password, Role, User, UserId, UserStatus};
    use tripdesk_core::ports::{Store, StoreChange, StoreError};

    use super::SqlStore;
    use crate::{connect_with_settings, migrations::run_pending};

    fn user(id: &str, name: &str) -> User {
        User {
            id: UserId(id.to_string()),
            name: name.to_string(),
            email: format!("{}@example.org", name.to_lowercase()),
            password: Password::new("demo123"),
            role: Role::Employee,
            status: UserStatus::Active,
            company: None,
            created: NaiveDate::from_ymd_opt(2025, 6, 15).expect("date"),
            version: 0,
        }
    }

    async fn store() -> SqlStore<User> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlStore::new(pool)
    }

    #[tokio::test]
    async fn create_numbers_rows_and_reads_them_back() {
        let store = store().await;
        store.create(user("USR-005", "Mel")).await.expect("seeded");
        let created = store.create(user("", "Sarah")).await.expect("create");

        assert_eq!(created.id.0, "USR-006");
        assert_eq!(created.version, 1);
        let loaded = store.get_by_id("USR-006").await.expect("get").expect("present");
        assert_eq!(loaded, created);
        assert_eq!(store.list().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn stale_update_is_rejected_and_row_is_unchanged() {
        let store = store().await;
        let created = store.create(user("", "Sarah")).await.expect("create");

        let mut renamed = created.clone();
        renamed.name = "Sarah K".to_string();
        store.update(renamed, 1).await.expect("first update");

        let mut stale = created.clone();
        stale.name = "Stale".to_string();
        let error = store.update(stale, 1).await.expect_err("stale");
        assert_eq!(error, StoreError::Conflict { id: created.id.0.clone(), expected: 1, actual: 2 });

        let current = store.get_by_id(&created.id.0).await.expect("get").expect("present");
        assert_eq!(current.name, "Sarah K");
        assert_eq!(current.version, 2);

        let missing = store.update(user("USR-404", "Ghost"), 1).await.expect_err("missing");
        assert!(matches!(missing, StoreError::NotFound { entity: "user", .. }));
    }

    #[tokio::test]
    async fn removed_ids_are_never_issued_again() {
        let store = store().await;
        let first = store.create(user("", "Sarah")).await.expect("create");
        let second = store.create(user("", "Glenda")).await.expect("create");
        store.remove(&second.id.0).await.expect("remove");

        let third = store.create(user("", "David")).await.expect("create after remove");
        assert_eq!(first.id.0, "USR-001");
        assert_eq!(second.id.0, "USR-002");
        assert_eq!(third.id.0, "USR-003");

        store.remove(&third.id.0).await.expect("remove");
        store.create(user("USR-010", "Mel")).await.expect("explicit id");
        let next = store.create(user("", "Admin")).await.expect("create after explicit");
        assert_eq!(next.id.0, "USR-011");
    }

    #[tokio::test]
    async fn remove_publishes_the_removed_row() {
        let store = store().await;
        let mut feed = store.subscribe();
        let created = store.create(user("", "Sarah")).await.expect("create");
        let removed = store.remove(&created.id.0).await.expect("remove");

        assert_eq!(removed.id, created.id);
        assert!(matches!(feed.recv().await.expect("created"), StoreChange::Created(_)));
        assert!(matches!(feed.recv().await.expect("removed"), StoreChange::Removed(_)));
        assert!(store.get_by_id(&created.id.0).await.expect("get").is_none());
    }
}
