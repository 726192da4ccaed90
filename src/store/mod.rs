//! In-memory document storage.
//!
//! Implements the storage boundary the document toolset runs against: one
//! logical database per user identity, named collections inside it, and
//! documents as opaque JSON maps carrying a generated unique [`ID_FIELD`].
//! Documents are not interpreted beyond schema inference (see [`schema`]).
//!
//! The store is cheap to clone (all state behind one `Arc<RwLock>`) and safe
//! for concurrent use from any number of sessions. Reads against a missing
//! collection behave as reads against an empty one; writes that require the
//! collection to exist say so explicitly, because the model is expected to
//! create collections deliberately rather than by side effect.

pub mod schema;
pub mod tools;

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub use schema::{FieldType, Schema, SchemaViolation, ID_FIELD};

/// Storage-level failures. These never leave the tool layer as errors; the
/// document tools render them into failure results for the model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("collection '{name}' does not exist")]
    CollectionNotFound { name: String },

    #[error("collection '{name}' already exists")]
    CollectionExists { name: String },

    #[error("{0}")]
    Violation(#[from] SchemaViolation),

    #[error("invalid filter: {message}")]
    InvalidFilter { message: String },
}

/// Outcome of a schema extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionOutcome {
    /// Existing documents that received the new fields.
    pub modified: usize,
    /// True when the collection was empty and a baseline document was
    /// inserted instead.
    pub seeded: bool,
}

type Collection = Vec<Map<String, Value>>;
type Database = HashMap<String, Collection>;

/// Concurrent in-memory document store, one database per user identity.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    databases: Arc<RwLock<HashMap<String, Database>>>,
}

impl DocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection. Fails if it already exists.
    pub async fn create_collection(&self, user: &str, name: &str) -> Result<(), StoreError> {
        let mut databases = self.databases.write().await;
        let database = databases.entry(user.to_string()).or_default();
        if database.contains_key(name) {
            return Err(StoreError::CollectionExists {
                name: name.to_string(),
            });
        }
        database.insert(name.to_string(), Vec::new());
        Ok(())
    }

    /// Names of the user's collections, sorted.
    pub async fn list_collections(&self, user: &str) -> Vec<String> {
        let databases = self.databases.read().await;
        let mut names: Vec<String> = databases
            .get(user)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Remove a collection and all its documents.
    pub async fn drop_collection(&self, user: &str, name: &str) -> Result<(), StoreError> {
        let mut databases = self.databases.write().await;
        let database = databases
            .get_mut(user)
            .ok_or_else(|| StoreError::CollectionNotFound {
                name: name.to_string(),
            })?;
        database
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::CollectionNotFound {
                name: name.to_string(),
            })
    }

    /// Insert a document after schema validation. The collection must exist.
    /// Returns the stored document, including omitted fields filled with
    /// zero values and the generated id.
    pub async fn insert(
        &self,
        user: &str,
        collection: &str,
        document: Map<String, Value>,
    ) -> Result<Map<String, Value>, StoreError> {
        let mut databases = self.databases.write().await;
        let docs = databases
            .get_mut(user)
            .and_then(|db| db.get_mut(collection))
            .ok_or_else(|| StoreError::CollectionNotFound {
                name: collection.to_string(),
            })?;

        let sample = docs.first();
        let mut validated = schema::validate_insert(sample, &document)?;
        validated.insert(ID_FIELD.to_string(), Value::String(new_document_id()));
        docs.push(validated.clone());
        Ok(validated)
    }

    /// Find one document by its generated id. Missing collections read as
    /// empty.
    pub async fn find_by_id(
        &self,
        user: &str,
        collection: &str,
        id: &str,
    ) -> Option<Map<String, Value>> {
        let databases = self.databases.read().await;
        databases
            .get(user)
            .and_then(|db| db.get(collection))
            .and_then(|docs| docs.iter().find(|doc| doc_id_is(doc, id)).cloned())
    }

    /// Documents matching the filter, in insertion order.
    pub async fn find_by_filter(
        &self,
        user: &str,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<Vec<Map<String, Value>>, StoreError> {
        let databases = self.databases.read().await;
        let docs = match databases.get(user).and_then(|db| db.get(collection)) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };
        let mut matched = Vec::new();
        for doc in docs {
            if matches_filter(doc, filter)? {
                matched.push(doc.clone());
            }
        }
        Ok(matched)
    }

    /// Every document in the collection, in insertion order.
    pub async fn get_all(&self, user: &str, collection: &str) -> Vec<Map<String, Value>> {
        let databases = self.databases.read().await;
        databases
            .get(user)
            .and_then(|db| db.get(collection))
            .cloned()
            .unwrap_or_default()
    }

    /// Count documents matching the filter.
    pub async fn count(
        &self,
        user: &str,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<usize, StoreError> {
        Ok(self.find_by_filter(user, collection, filter).await?.len())
    }

    /// Apply `$set` semantics to one document by id. Returns the number of
    /// documents modified (0 or 1).
    pub async fn update_by_id(
        &self,
        user: &str,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> usize {
        let mut databases = self.databases.write().await;
        let docs = match databases.get_mut(user).and_then(|db| db.get_mut(collection)) {
            Some(docs) => docs,
            None => return 0,
        };
        match docs.iter_mut().find(|doc| doc_id_is(doc, id)) {
            Some(doc) => {
                apply_set(doc, fields);
                1
            }
            None => 0,
        }
    }

    /// Apply `$set` semantics to every document matching the filter.
    /// Returns the number of documents modified.
    pub async fn update_by_filter(
        &self,
        user: &str,
        collection: &str,
        filter: &Map<String, Value>,
        fields: &Map<String, Value>,
    ) -> Result<usize, StoreError> {
        let mut databases = self.databases.write().await;
        let docs = match databases.get_mut(user).and_then(|db| db.get_mut(collection)) {
            Some(docs) => docs,
            None => return Ok(0),
        };
        let mut modified = 0;
        for doc in docs.iter_mut() {
            if matches_filter(doc, filter)? {
                apply_set(doc, fields);
                modified += 1;
            }
        }
        Ok(modified)
    }

    /// Delete one document by id. Returns the number deleted (0 or 1).
    pub async fn delete_by_id(&self, user: &str, collection: &str, id: &str) -> usize {
        let mut databases = self.databases.write().await;
        let docs = match databases.get_mut(user).and_then(|db| db.get_mut(collection)) {
            Some(docs) => docs,
            None => return 0,
        };
        let before = docs.len();
        docs.retain(|doc| !doc_id_is(doc, id));
        before - docs.len()
    }

    /// Delete every document matching the filter. Returns the number
    /// deleted.
    pub async fn delete_by_filter(
        &self,
        user: &str,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<usize, StoreError> {
        let mut databases = self.databases.write().await;
        let docs = match databases.get_mut(user).and_then(|db| db.get_mut(collection)) {
            Some(docs) => docs,
            None => return Ok(0),
        };
        let before = docs.len();
        let mut kept = Vec::with_capacity(before);
        for doc in docs.drain(..) {
            if matches_filter(&doc, filter)? {
                continue;
            }
            kept.push(doc);
        }
        let deleted = before - kept.len();
        *docs = kept;
        Ok(deleted)
    }

    /// The collection's inferred schema. `Ok(None)` for an existing but
    /// empty collection; an error when the collection does not exist.
    pub async fn schema(&self, user: &str, collection: &str) -> Result<Option<Schema>, StoreError> {
        let databases = self.databases.read().await;
        let docs = databases
            .get(user)
            .and_then(|db| db.get(collection))
            .ok_or_else(|| StoreError::CollectionNotFound {
                name: collection.to_string(),
            })?;
        Ok(docs.first().map(schema::infer_schema))
    }

    /// Extend the schema baseline: apply `new_fields` with `$set` semantics
    /// to every existing document. An empty collection is seeded with one
    /// document consisting solely of the new fields (plus a generated id) so
    /// the baseline becomes non-empty. Idempotent.
    pub async fn extend_schema(
        &self,
        user: &str,
        collection: &str,
        new_fields: &Map<String, Value>,
    ) -> Result<ExtensionOutcome, StoreError> {
        let mut databases = self.databases.write().await;
        let docs = databases
            .get_mut(user)
            .and_then(|db| db.get_mut(collection))
            .ok_or_else(|| StoreError::CollectionNotFound {
                name: collection.to_string(),
            })?;

        if docs.is_empty() {
            let mut seed = new_fields.clone();
            seed.insert(ID_FIELD.to_string(), Value::String(new_document_id()));
            docs.push(seed);
            return Ok(ExtensionOutcome {
                modified: 0,
                seeded: true,
            });
        }

        for doc in docs.iter_mut() {
            apply_set(doc, new_fields);
        }
        Ok(ExtensionOutcome {
            modified: docs.len(),
            seeded: false,
        })
    }
}

fn new_document_id() -> String {
    Uuid::new_v4().to_string()
}

fn doc_id_is(doc: &Map<String, Value>, id: &str) -> bool {
    doc.get(ID_FIELD).and_then(Value::as_str) == Some(id)
}

fn apply_set(doc: &mut Map<String, Value>, fields: &Map<String, Value>) {
    for (key, value) in fields {
        if key == ID_FIELD {
            continue;
        }
        doc.insert(key.clone(), value.clone());
    }
}

/// Equality matching per filter field, with `{"$regex": pattern}` supported
/// against string fields. A filter referencing a field the document lacks
/// matches nothing.
fn matches_filter(doc: &Map<String, Value>, filter: &Map<String, Value>) -> Result<bool, StoreError> {
    for (key, expected) in filter {
        let actual = match doc.get(key) {
            Some(actual) => actual,
            None => return Ok(false),
        };
        if let Some(pattern) = regex_operand(expected) {
            let re = Regex::new(pattern).map_err(|e| StoreError::InvalidFilter {
                message: format!("bad $regex for field '{key}': {e}"),
            })?;
            match actual.as_str() {
                Some(text) if re.is_match(text) => continue,
                _ => return Ok(false),
            }
        }
        if actual != expected {
            return Ok(false);
        }
    }
    Ok(true)
}

fn regex_operand(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.len() == 1 {
        object.get("$regex")?.as_str()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_collections() {
        let store = DocumentStore::new();
        store.create_collection("mira", "notes").await.unwrap();
        store.create_collection("mira", "books").await.unwrap();

        assert_eq!(store.list_collections("mira").await, vec!["books", "notes"]);
        assert!(store.list_collections("someone_else").await.is_empty());

        let err = store.create_collection("mira", "notes").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::CollectionExists {
                name: "notes".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_insert_requires_collection() {
        let store = DocumentStore::new();
        let err = store
            .insert("mira", "missing", obj(json!({"name": "Ann"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CollectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_insert_round_trip_fills_zero_values() {
        let store = DocumentStore::new();
        store.create_collection("mira", "people").await.unwrap();

        store
            .insert("mira", "people", obj(json!({"name": "Ann", "age": 30})))
            .await
            .unwrap();
        let stored = store
            .insert("mira", "people", obj(json!({"name": "Bo"})))
            .await
            .unwrap();

        let found = store
            .find_by_id("mira", "people", stored[ID_FIELD].as_str().unwrap())
            .await
            .unwrap();
        assert_eq!(found["name"], json!("Bo"));
        assert_eq!(found["age"], json!(0));
    }

    #[tokio::test]
    async fn test_insert_rejects_schema_drift() {
        let store = DocumentStore::new();
        store.create_collection("mira", "people").await.unwrap();
        store
            .insert("mira", "people", obj(json!({"name": "Ann"})))
            .await
            .unwrap();

        let err = store
            .insert("mira", "people", obj(json!({"name": "Bo", "age": 5})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Violation(SchemaViolation::UnknownFields {
                fields: vec!["age".to_string()]
            })
        );
    }

    #[tokio::test]
    async fn test_extension_then_insert_accepted() {
        let store = DocumentStore::new();
        store.create_collection("mira", "people").await.unwrap();
        store
            .insert("mira", "people", obj(json!({"name": "Ann"})))
            .await
            .unwrap();

        let outcome = store
            .extend_schema("mira", "people", &obj(json!({"age": 0})))
            .await
            .unwrap();
        assert_eq!(outcome.modified, 1);
        assert!(!outcome.seeded);

        let stored = store
            .insert("mira", "people", obj(json!({"name": "Bo", "age": 5})))
            .await
            .unwrap();
        assert_eq!(stored["age"], json!(5));
    }

    #[tokio::test]
    async fn test_extension_is_idempotent() {
        let store = DocumentStore::new();
        store.create_collection("mira", "people").await.unwrap();
        store
            .insert("mira", "people", obj(json!({"name": "Ann"})))
            .await
            .unwrap();

        let fields = obj(json!({"age": 0}));
        store.extend_schema("mira", "people", &fields).await.unwrap();
        let once = store.schema("mira", "people").await.unwrap();
        store.extend_schema("mira", "people", &fields).await.unwrap();
        let twice = store.schema("mira", "people").await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_extension_seeds_empty_collection() {
        let store = DocumentStore::new();
        store.create_collection("mira", "people").await.unwrap();

        let outcome = store
            .extend_schema("mira", "people", &obj(json!({"age": 0})))
            .await
            .unwrap();
        assert!(outcome.seeded);

        let schema = store.schema("mira", "people").await.unwrap().unwrap();
        assert_eq!(schema["age"], FieldType::Integer);
        assert_eq!(store.get_all("mira", "people").await.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_equality_and_regex() {
        let store = DocumentStore::new();
        store.create_collection("mira", "people").await.unwrap();
        store
            .insert("mira", "people", obj(json!({"name": "Ann", "city": "Lisbon"})))
            .await
            .unwrap();
        store
            .insert("mira", "people", obj(json!({"name": "Bo", "city": "London"})))
            .await
            .unwrap();

        let matched = store
            .find_by_filter("mira", "people", &obj(json!({"city": "Lisbon"})))
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0]["name"], json!("Ann"));

        let matched = store
            .find_by_filter("mira", "people", &obj(json!({"city": {"$regex": "^L"}})))
            .await
            .unwrap();
        assert_eq!(matched.len(), 2);

        let err = store
            .find_by_filter("mira", "people", &obj(json!({"city": {"$regex": "("}})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter { .. }));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = DocumentStore::new();
        store.create_collection("mira", "people").await.unwrap();
        let ann = store
            .insert("mira", "people", obj(json!({"name": "Ann", "age": 30})))
            .await
            .unwrap();
        store
            .insert("mira", "people", obj(json!({"name": "Bo", "age": 20})))
            .await
            .unwrap();

        let ann_id = ann[ID_FIELD].as_str().unwrap();
        assert_eq!(
            store
                .update_by_id("mira", "people", ann_id, &obj(json!({"age": 31})))
                .await,
            1
        );
        assert_eq!(
            store
                .find_by_id("mira", "people", ann_id)
                .await
                .unwrap()["age"],
            json!(31)
        );

        let modified = store
            .update_by_filter(
                "mira",
                "people",
                &obj(json!({})),
                &obj(json!({"active": true})),
            )
            .await
            .unwrap();
        assert_eq!(modified, 2);

        assert_eq!(store.delete_by_id("mira", "people", ann_id).await, 1);
        assert_eq!(store.delete_by_id("mira", "people", ann_id).await, 0);
        let deleted = store
            .delete_by_filter("mira", "people", &obj(json!({"name": "Bo"})))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_all("mira", "people").await.is_empty());
    }

    #[tokio::test]
    async fn test_databases_are_isolated_per_user() {
        let store = DocumentStore::new();
        store.create_collection("mira", "notes").await.unwrap();
        store.create_collection("noor", "notes").await.unwrap();
        store
            .insert("mira", "notes", obj(json!({"text": "mine"})))
            .await
            .unwrap();

        assert_eq!(store.get_all("mira", "notes").await.len(), 1);
        assert!(store.get_all("noor", "notes").await.is_empty());
    }

    #[tokio::test]
    async fn test_schema_of_missing_collection_errors() {
        let store = DocumentStore::new();
        let err = store.schema("mira", "ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::CollectionNotFound { .. }));

        store.create_collection("mira", "empty").await.unwrap();
        assert_eq!(store.schema("mira", "empty").await.unwrap(), None);
    }
}
