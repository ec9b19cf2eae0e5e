use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use tripdesk_core::ports::{Entity, IdScope, Store, StoreChange, StoreError};

const CHANGE_FEED_CAPACITY: usize = 256;

struct Rows<E> {
    // Creation order.
    entities: Vec<E>,
    sequences: HashMap<IdScope, u32>,
}

/// Process-local store with the same contract as the SQLite one.
pub struct InMemoryStore<E: Entity> {
    rows: RwLock<Rows<E>>,
    changes: broadcast::Sender<StoreChange<E>>,
}

impl<E: Entity> InMemoryStore<E> {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { rows: RwLock::new(Rows { entities: Vec::new(), sequences: HashMap::new() }), changes }
    }

    fn publish(&self, change: StoreChange<E>) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

impl<E: Entity> Default for InMemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> Store<E> for InMemoryStore<E> {
    async fn create(&self, mut entity: E) -> Result<E, StoreError> {
        let mut rows = self.rows.write().await;
        let scope = entity.id_scope();
        let next = rows.sequences.get(&scope).copied().unwrap_or(0) + 1;

        // Caller-supplied ids (fixtures, imports) keep their number and push
        // the sequence past it.
        let sequence = scope.sequence_of(entity.id()).unwrap_or(next);
        if entity.id().is_empty() {
            entity.assign_id(scope.format(sequence));
        }
        if rows.entities.iter().any(|row| row.id() == entity.id()) {
            return Err(StoreError::Backend(format!("{} `{}` already exists", E::KIND, entity.id())));
        }

        let high_water = rows.sequences.entry(scope).or_insert(0);
        *high_water = (*high_water).max(sequence);
        entity.set_version(1);
        rows.entities.push(entity.clone());
        drop(rows);

        self.publish(StoreChange::Created(entity.clone()));
        Ok(entity)
    }

    async fn update(&self, mut entity: E, expected_version: u64) -> Result<E, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.entities.iter_mut().find(|row| row.id() == entity.id()) else {
            return Err(StoreError::NotFound { entity: E::KIND, id: entity.id().to_string() });
        };
        if row.version() != expected_version {
            return Err(StoreError::Conflict {
                id: entity.id().to_string(),
                expected: expected_version,
                actual: row.version(),
            });
        }

        entity.set_version(expected_version + 1);
        *row = entity.clone();
        drop(rows);

        self.publish(StoreChange::Updated(entity.clone()));
        Ok(entity)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<E>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.entities.iter().find(|row| row.id() == id).cloned())
    }

    async fn list(&self) -> Result<Vec<E>, StoreError> {
        Ok(self.rows.read().await.entities.clone())
    }

    async fn remove(&self, id: &str) -> Result<E, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(position) = rows.entities.iter().position(|row| row.id() == id) else {
            return Err(StoreError::NotFound { entity: E::KIND, id: id.to_string() });
        };
        let removed = rows.entities.remove(position);
        drop(rows);

        self.publish(StoreChange::Removed(removed.clone()));
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange<E>> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};

    use tripdesk_core::domain::document::{Document, DocumentId, DocumentType};
    use tripdesk_core::domain::request::RequestId;
    use tripdesk_core::ports::{Store, StoreChange, StoreError};

    use super::InMemoryStore;

    fn document(id: &str) -> Document {
        Document {
            id: DocumentId(id.to_string()),
            request_id: RequestId("REQ-2026-004".to_string()),
            doc_type: DocumentType::Invoice,
            file_name: "invoice.pdf".to_string(),
            metadata: BTreeMap::new(),
            uploaded_by: "Glenda".to_string(),
            uploaded_at: Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).single().expect("timestamp"),
            forwarded_to_finance: false,
            forwarded_at: None,
            forwarded_by: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn create_allocates_ids_after_seeded_ones() {
        let store = InMemoryStore::new();
        store.create(document("DOC-003")).await.expect("seeded");
        let fresh = store.create(document("")).await.expect("fresh");

        assert_eq!(fresh.id.0, "DOC-004");
        assert_eq!(fresh.version, 1);
        assert!(store.create(document("DOC-003")).await.is_err());
    }

    #[tokio::test]
    async fn update_is_a_compare_and_swap() {
        let store = InMemoryStore::new();
        let created = store.create(document("")).await.expect("create");

        let mut first = created.clone();
        first.file_name = "renamed.pdf".to_string();
        let stored = store.update(first, created.version).await.expect("first writer wins");
        assert_eq!(stored.version, 2);

        let mut second = created.clone();
        second.file_name = "lost.pdf".to_string();
        let error = store.update(second, created.version).await.expect_err("second writer loses");
        assert_eq!(
            error,
            StoreError::Conflict { id: created.id.0.clone(), expected: 1, actual: 2 }
        );

        let current = store.get_by_id(&created.id.0).await.expect("get").expect("present");
        assert_eq!(current.file_name, "renamed.pdf");
    }

    #[tokio::test]
    async fn subscribers_see_every_change_in_order() {
        let store = InMemoryStore::new();
        let mut feed = store.subscribe();

        let created = store.create(document("")).await.expect("create");
        store.update(created.clone(), created.version).await.expect("update");
        store.remove(&created.id.0).await.expect("remove");

        assert!(matches!(feed.recv().await.expect("created"), StoreChange::Created(_)));
        assert!(matches!(feed.recv().await.expect("updated"), StoreChange::Updated(doc) if doc.version == 2));
        assert!(matches!(feed.recv().await.expect("removed"), StoreChange::Removed(_)));
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let store: InMemoryStore<Document> = InMemoryStore::new();
        assert!(store.get_by_id("DOC-404").await.expect("get").is_none());
        assert!(matches!(
            store.remove("DOC-404").await,
            Err(StoreError::NotFound { entity: "document", .. })
        ));
    }
}
