// src/store/memory.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    Document, DocumentStore, Filter, ServerTimestamp, StoreError, Subscription, WatcherRegistry,
    merge_patch,
};
use crate::engine::clock::{SystemTimeSource, TimeSource};

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// Process-local document store.
///
/// Writes and the notifications they trigger happen under the same lock, so
/// subscribers observe states in write order.
pub struct MemoryStore {
    collections: RwLock<Collections>,
    watchers: WatcherRegistry,
    time: Arc<dyn TimeSource>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    /// A store whose server timestamps come from `time`.
    pub fn with_time_source(time: Arc<dyn TimeSource>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            watchers: WatcherRegistry::new(),
            time,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, collections: &Collections, collection: &str) {
        if self.watchers.is_watching(collection) {
            self.watchers.publish(collection, &snapshot(collections, collection));
        }
    }
}

fn snapshot(collections: &Collections, collection: &str) -> Vec<Document> {
    collections
        .get(collection)
        .map(|docs| {
            docs.iter()
                .map(|(id, data)| Document {
                    id: id.clone(),
                    data: data.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert(collection, &id, data).await?;
        Ok(id)
    }

    async fn insert(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        if !data.is_object() {
            return Err(StoreError::Serialization(
                "documents must be JSON objects".to_string(),
            ));
        }
        let mut collections = self.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        docs.insert(id.to_string(), data);
        self.publish(&collections, collection);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.read();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        let mut collections = self.write();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        merge_patch(doc, &patch)?;
        self.publish(&collections, collection);
        Ok(())
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        precondition: &Filter,
        patch: Value,
    ) -> Result<bool, StoreError> {
        let mut collections = self.write();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        if !precondition.matches(doc) {
            return Ok(false);
        }
        merge_patch(doc, &patch)?;
        self.publish(&collections, collection);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.write();
        let removed = collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.publish(&collections, collection);
        }
        Ok(())
    }

    async fn get_all(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let collections = self.read();
        Ok(snapshot(&collections, collection)
            .into_iter()
            .filter(|doc| filter.matches_document(doc))
            .collect())
    }

    async fn subscribe(&self, collection: &str, filter: Filter) -> Result<Subscription, StoreError> {
        let collections = self.read();
        Ok(self
            .watchers
            .register(collection, filter, &snapshot(&collections, collection)))
    }

    async fn server_timestamp(&self) -> Result<ServerTimestamp, StoreError> {
        Ok(ServerTimestamp::from_epoch_millis(self.time.now_ms()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;

    #[tokio::test]
    async fn update_fails_for_missing_document() {
        let store = MemoryStore::new();
        let err = store
            .update("quizzes", "missing", json!({ "status": "active" }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        store.insert("results", "q:ana", json!({ "score": 0 })).await.unwrap();
        let err = store
            .insert("results", "q:ana", json!({ "score": 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn update_if_applies_once() {
        let store = MemoryStore::new();
        let id = store.create("quizzes", json!({ "status": "active" })).await.unwrap();
        let running = Filter::all().eq("status", "active");

        let first = store
            .update_if("quizzes", &id, &running, json!({ "status": "completed" }))
            .await
            .unwrap();
        let second = store
            .update_if("quizzes", &id, &running, json!({ "status": "completed" }))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn subscription_delivers_initial_state_and_changes() {
        let store = MemoryStore::new();
        store.insert("quizzes", "a", json!({ "status": "draft" })).await.unwrap();
        let mut sub = store
            .subscribe("quizzes", Filter::all().eq("status", "active"))
            .await
            .unwrap();

        assert!(sub.changed().await.unwrap().is_empty());

        store.update("quizzes", "a", json!({ "status": "active" })).await.unwrap();
        let docs = sub.changed().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a");
    }

    #[tokio::test]
    async fn scoped_subscription_ignores_other_documents() {
        let store = MemoryStore::new();
        store.insert("quizzes", "a", json!({ "status": "active" })).await.unwrap();
        store.insert("quizzes", "b", json!({ "status": "draft" })).await.unwrap();
        let mut sub = store
            .subscribe("quizzes", Filter::all().id("a"))
            .await
            .unwrap();
        assert_eq!(sub.changed().await.unwrap().len(), 1);

        store.update("quizzes", "b", json!({ "status": "scheduled" })).await.unwrap();
        assert!(sub.changed().now_or_never().is_none());

        store.update("quizzes", "a", json!({ "status": "paused" })).await.unwrap();
        let docs = sub.changed().await.unwrap();
        assert_eq!(docs[0].data["status"], "paused");
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let store = MemoryStore::new();
        let sub = store.subscribe("quizzes", Filter::all()).await.unwrap();
        assert!(store.watchers.is_watching("quizzes"));
        sub.unsubscribe();
        assert!(!store.watchers.is_watching("quizzes"));
    }
}
