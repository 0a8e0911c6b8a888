use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    merge_top_level, Document, DocumentStore, OrderBy, Precondition, Predicate, StoreError,
};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    unavailable: AtomicBool,
}

impl InMemoryDocumentStore {
    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Inserts a document under a caller-chosen id, bypassing id assignment.
    pub async fn insert_raw(&self, collection: &str, id: &str, data: Value) {
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().insert(id.to_string(), data);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        self.ensure_available()?;
        let id = Uuid::new_v4().simple().to_string();
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().insert(id.clone(), data);
        Ok(id)
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.ensure_available()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .map(|data| Document { id: id.to_string(), data: data.clone() }))
    }

    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<Document>, StoreError> {
        self.ensure_available()?;
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<Document> = documents
            .iter()
            .filter(|(_, data)| predicates.iter().all(|predicate| predicate.matches(data)))
            .map(|(id, data)| Document { id: id.clone(), data: data.clone() })
            .collect();

        if let Some(order_by) = order_by {
            matched.sort_by(|left, right| order_by.compare(&left.data, &right.data));
        }

        Ok(matched)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
        precondition: Option<&Precondition>,
    ) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut collections = self.collections.write().await;
        let Some(stored) = collections.get_mut(collection).and_then(|documents| documents.get_mut(id))
        else {
            return Err(StoreError::NotFound { collection: collection.to_string(), id: id.to_string() });
        };

        if let Some(precondition) = precondition {
            if !precondition.holds(stored) {
                return Err(StoreError::PreconditionFailed {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    field: precondition.field().to_string(),
                });
            }
        }

        merge_top_level(stored, patch);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let mut collections = self.collections.write().await;
        Ok(collections.get_mut(collection).and_then(|documents| documents.remove(id)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use crate::store::{
        DocumentStore, InMemoryDocumentStore, OrderBy, Precondition, Predicate, StoreError,
    };

    fn patch(key: &str, value: Value) -> Map<String, Value> {
        let mut patch = Map::new();
        patch.insert(key.to_string(), value);
        patch
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let store = InMemoryDocumentStore::default();
        let id = store.create("requests", json!({"status": "pending"})).await.expect("create");

        let found = store.get_by_id("requests", &id).await.expect("read").expect("present");
        assert_eq!(found.data["status"], "pending");
        assert!(store.get_by_id("requests", "nope").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn query_filters_conjunctively_and_sorts() {
        let store = InMemoryDocumentStore::default();
        store
            .insert_raw("requests", "a", json!({"status": "pending", "createdAt": "2026-01-01T00:00:00Z"}))
            .await;
        store
            .insert_raw("requests", "b", json!({"status": "pending", "createdAt": "2026-02-01T00:00:00Z"}))
            .await;
        store
            .insert_raw("requests", "c", json!({"status": "approved", "createdAt": "2026-03-01T00:00:00Z"}))
            .await;

        let found = store
            .query(
                "requests",
                &[Predicate::eq("status", "pending")],
                Some(&OrderBy::desc("createdAt")),
            )
            .await
            .expect("query");

        let ids: Vec<&str> = found.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = InMemoryDocumentStore::default();
        let error = store
            .update("requests", "ghost", patch("status", json!("approved")), None)
            .await
            .expect_err("missing document");

        assert!(matches!(error, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn failed_precondition_leaves_document_untouched() {
        let store = InMemoryDocumentStore::default();
        store.insert_raw("requests", "a", json!({"status": "pending", "updatedAt": "v2"})).await;

        let guard =
            Precondition::FieldEquals { field: "updatedAt".to_string(), value: json!("v1") };
        let error = store
            .update("requests", "a", patch("status", json!("approved")), Some(&guard))
            .await
            .expect_err("stale write");
        assert!(matches!(error, StoreError::PreconditionFailed { .. }));

        let stored = store.get_by_id("requests", "a").await.expect("read").expect("present");
        assert_eq!(stored.data["status"], "pending");
    }

    #[tokio::test]
    async fn offline_switch_fails_every_call() {
        let store = InMemoryDocumentStore::default();
        store.set_unavailable(true);

        let error = store.query("requests", &[], None).await.expect_err("offline");
        assert!(matches!(error, StoreError::Unavailable(_)));

        store.set_unavailable(false);
        assert!(store.query("requests", &[], None).await.expect("online").is_empty());
    }

    #[tokio::test]
    async fn delete_reports_whether_document_existed() {
        let store = InMemoryDocumentStore::default();
        store.insert_raw("requests", "a", json!({})).await;

        assert!(store.delete("requests", "a").await.expect("delete"));
        assert!(!store.delete("requests", "a").await.expect("delete again"));
    }
}
