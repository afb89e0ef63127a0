// src/store/mod.rs

//! The document store the quiz service persists into.
//!
//! Records are schemaless JSON documents grouped in collections, updated with
//! shallow-merge patches, and observable through subscriptions that always
//! hold the latest matching state.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::watch;

pub mod memory;
pub mod sqlite;
mod watchers;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use watchers::WatcherRegistry;

pub const QUIZZES: &str = "quizzes";
pub const RESULTS: &str = "results";
pub const ATTENDANCE: &str = "attendance";
pub const CLASS_RESULTS: &str = "classResults";

#[derive(Debug)]
pub enum StoreError {
    NotFound { collection: String, id: String },
    AlreadyExists { collection: String, id: String },
    /// The backing store could not be reached or rejected the operation.
    Unavailable(String),
    /// A record could not be encoded or decoded.
    Serialization(String),
    /// The subscription's source was dropped.
    Closed,
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { collection, id } => {
                write!(f, "document {}/{} not found", collection, id)
            }
            StoreError::AlreadyExists { collection, id } => {
                write!(f, "document {}/{} already exists", collection, id)
            }
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
            StoreError::Serialization(msg) => write!(f, "malformed document: {}", msg),
            StoreError::Closed => write!(f, "subscription closed"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// A stored record together with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    /// Decodes the document into a typed record.
    /// The document id is exposed to the record as its `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut data = self.data.clone();
        if let Value::Object(map) = &mut data {
            map.insert("id".to_string(), Value::String(self.id.clone()));
        }
        Ok(serde_json::from_value(data)?)
    }
}

/// Encodes a typed record for storage. The `id` field is kept out of the body.
pub fn encode<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        map.remove("id");
    }
    Ok(value)
}

/// Applies a patch the way a document update does: top-level keys replace.
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) -> Result<(), StoreError> {
    let (Value::Object(target), Value::Object(patch)) = (target, patch) else {
        return Err(StoreError::Serialization(
            "documents and patches must be JSON objects".to_string(),
        ));
    };
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(Value),
    OneOf(Vec<Value>),
}

/// Field conditions a document must satisfy. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    document_id: Option<String>,
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the filter to the single document `id`.
    pub fn id(mut self, id: &str) -> Self {
        self.document_id = Some(id.to_string());
        self
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push((field.to_string(), Condition::Eq(value.into())));
        self
    }

    pub fn one_of<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions
            .push((field.to_string(), Condition::OneOf(values)));
        self
    }

    /// Checks id and field conditions against a stored document.
    pub fn matches_document(&self, doc: &Document) -> bool {
        self.document_id.as_deref().is_none_or(|id| id == doc.id) && self.matches(&doc.data)
    }

    /// Checks the field conditions only.
    pub fn matches(&self, data: &Value) -> bool {
        self.conditions.iter().all(|(field, condition)| {
            let actual = data.get(field).unwrap_or(&Value::Null);
            match condition {
                Condition::Eq(expected) => actual == expected,
                Condition::OneOf(options) => options.contains(actual),
            }
        })
    }
}

/// A timestamp assigned by the store itself.
///
/// Stores report it as seconds plus nanoseconds; it is converted to epoch
/// milliseconds before any arithmetic happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTimestamp {
    #[serde(alias = "_seconds")]
    pub seconds: i64,
    #[serde(alias = "_nanoseconds", default)]
    pub nanoseconds: u32,
}

impl ServerTimestamp {
    pub fn from_epoch_millis(ms: i64) -> Self {
        Self {
            seconds: ms.div_euclid(1000),
            nanoseconds: (ms.rem_euclid(1000) as u32) * 1_000_000,
        }
    }

    pub fn to_epoch_millis(self) -> i64 {
        self.seconds * 1000 + i64::from(self.nanoseconds / 1_000_000)
    }
}

/// A live view of the documents matching a filter.
///
/// The first call to [`Subscription::changed`] resolves immediately with the
/// state at subscribe time; later calls resolve on every change. Dropping the
/// subscription (or calling [`Subscription::unsubscribe`]) stops deliveries.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<Vec<Document>>,
}

impl Subscription {
    pub(crate) fn new(mut rx: watch::Receiver<Vec<Document>>) -> Self {
        rx.mark_changed();
        Self { rx }
    }

    pub async fn changed(&mut self) -> Result<Vec<Document>, StoreError> {
        self.rx.changed().await.map_err(|_| StoreError::Closed)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {}
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores a new document under a generated id and returns the id.
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    /// Stores a new document under a caller-chosen id.
    /// Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Shallow-merges `patch` into an existing document. Fails with `NotFound`.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError>;

    /// Applies `patch` only if the current document matches `precondition`.
    /// Returns whether the patch was applied.
    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        precondition: &Filter,
        patch: Value,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn get_all(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    async fn subscribe(&self, collection: &str, filter: Filter) -> Result<Subscription, StoreError>;

    /// Writes a probe stamped by the store's own clock and reads it back.
    async fn server_timestamp(&self) -> Result<ServerTimestamp, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_equality_and_membership() {
        let doc = json!({ "status": "active", "class": "7B" });

        assert!(Filter::all().matches(&doc));
        assert!(Filter::all().eq("status", "active").matches(&doc));
        assert!(!Filter::all().eq("status", "paused").matches(&doc));
        assert!(
            Filter::all()
                .one_of("status", ["waiting", "active"])
                .eq("class", "7B")
                .matches(&doc)
        );
        // Missing fields compare as null.
        assert!(Filter::all().eq("scheduledTime", Value::Null).matches(&doc));
    }

    #[test]
    fn id_filter_selects_one_document() {
        let doc = |id: &str| Document {
            id: id.to_string(),
            data: json!({ "status": "active" }),
        };
        let filter = Filter::all().id("a").eq("status", "active");

        assert!(filter.matches_document(&doc("a")));
        assert!(!filter.matches_document(&doc("b")));
        assert!(Filter::all().matches_document(&doc("b")));
    }

    #[test]
    fn server_timestamp_normalizes_to_millis() {
        let ts: ServerTimestamp =
            serde_json::from_value(json!({ "_seconds": 1_700_000_000, "_nanoseconds": 250_000_000 }))
                .unwrap();
        assert_eq!(ts.to_epoch_millis(), 1_700_000_000_250);
        assert_eq!(ServerTimestamp::from_epoch_millis(1_700_000_000_250), ts);
    }

    #[test]
    fn merge_patch_replaces_top_level_keys() {
        let mut doc = json!({ "status": "active", "score": 1 });
        merge_patch(&mut doc, &json!({ "status": "completed", "endedAt": 5 })).unwrap();
        assert_eq!(doc, json!({ "status": "completed", "score": 1, "endedAt": 5 }));
    }
}
