//! Built-in document tools.
//!
//! One tool per store operation, all sharing a [`DocumentStore`] handle and
//! all scoped by the injected caller identity. Domain failures (missing
//! collection, schema violation, bad filter) come back as failure outcomes
//! the model can recover from; `Err` is reserved for malformed parameters.
//!
//! Two failure messages deliberately name another tool: inserting into a
//! missing collection points at `create_collection`, and inserting fields
//! outside the schema points at `extend_collection_schema`. The model is
//! expected to follow those hints, retry, and only then report back.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::dispatch::IDENTITY_ARGUMENT;
use crate::error::DocentError;
use crate::registry::{Registry, Tool, ToolOutcome};

use super::schema::SchemaViolation;
use super::{DocumentStore, StoreError, ID_FIELD};

/// Register the whole document toolset against one shared store.
pub async fn register_document_tools(registry: &Registry, store: &DocumentStore) {
    registry
        .register_tool(Box::new(CreateCollectionTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(InsertDocumentTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(FindDocumentByIdTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(FindDocumentsByFilterTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(UpdateDocumentByIdTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(UpdateDocumentsByFilterTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(DeleteDocumentByIdTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(DeleteDocumentsByFilterTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(CountDocumentsTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(GetAllDocumentsTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(GetCollectionSchemaTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(ListCollectionsTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(ExtendCollectionSchemaTool::new(store.clone())))
        .await;
    registry
        .register_tool(Box::new(DropCollectionTool::new(store.clone())))
        .await;
}

fn require_str<'a>(arguments: &'a Value, key: &str) -> crate::Result<&'a str> {
    arguments.get(key).and_then(Value::as_str).ok_or_else(|| {
        DocentError::invalid_input(format!("missing required string parameter '{key}'"))
    })
}

fn require_map(arguments: &Value, key: &str) -> crate::Result<Map<String, Value>> {
    arguments
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| {
            DocentError::invalid_input(format!("missing required object parameter '{key}'"))
        })
}

fn optional_map(arguments: &Value, key: &str) -> crate::Result<Map<String, Value>> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(DocentError::invalid_input(format!(
            "parameter '{key}' must be an object"
        ))),
    }
}

fn caller(arguments: &Value) -> crate::Result<&str> {
    require_str(arguments, IDENTITY_ARGUMENT)
}

fn store_failure(err: StoreError) -> ToolOutcome {
    ToolOutcome::failure(err.to_string())
}

/// Create an empty collection in the caller's database.
#[derive(Debug, Clone)]
pub struct CreateCollectionTool {
    store: DocumentStore,
}

impl CreateCollectionTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateCollectionTool {
    fn name(&self) -> &str {
        "create_collection"
    }

    fn description(&self) -> &str {
        "Create a new, empty collection. Fails if the collection already exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Name of the collection to create" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        match self.store.create_collection(identity, collection).await {
            Ok(()) => Ok(ToolOutcome::text(format!(
                "created collection '{collection}'"
            ))),
            Err(e) => Ok(store_failure(e)),
        }
    }
}

/// Insert a document, subject to the collection's inferred schema.
///
/// The first document inserted into an empty collection becomes the schema
/// baseline verbatim. Later inserts may omit fields (they are filled with
/// zero values) but may not introduce new ones or change a field's type.
#[derive(Debug, Clone)]
pub struct InsertDocumentTool {
    store: DocumentStore,
}

impl InsertDocumentTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for InsertDocumentTool {
    fn name(&self) -> &str {
        "insert_document"
    }

    fn description(&self) -> &str {
        "Insert a document into a collection. The first document defines the schema; \
         later documents must stay within it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Target collection" },
                "document": { "type": "object", "description": "Document fields to insert" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "document", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        let document = require_map(&arguments, "document")?;
        match self.store.insert(identity, collection, document).await {
            Ok(stored) => {
                let id = stored
                    .get(ID_FIELD)
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(ToolOutcome::json(json!({
                    "id": id,
                    "document": Value::Object(stored),
                })))
            }
            Err(StoreError::CollectionNotFound { name }) => Ok(ToolOutcome::failure(format!(
                "collection '{name}' does not exist; create it first with the create_collection tool"
            ))),
            Err(StoreError::Violation(violation)) => {
                let hint = match &violation {
                    SchemaViolation::UnknownFields { .. } => {
                        "; add the new fields to every document first with the extend_collection_schema tool"
                    }
                    SchemaViolation::TypeMismatch { .. } => "",
                };
                Ok(ToolOutcome::failure(format!(
                    "cannot insert document: {violation}{hint}"
                )))
            }
            Err(e) => Ok(store_failure(e)),
        }
    }
}

/// Fetch one document by its generated id.
#[derive(Debug, Clone)]
pub struct FindDocumentByIdTool {
    store: DocumentStore,
}

impl FindDocumentByIdTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FindDocumentByIdTool {
    fn name(&self) -> &str {
        "find_document_by_id"
    }

    fn description(&self) -> &str {
        "Fetch a single document by its id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection to search" },
                "document_id": { "type": "string", "description": "Id of the document" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "document_id", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        let id = require_str(&arguments, "document_id")?;
        match self.store.find_by_id(identity, collection, id).await {
            Some(doc) => Ok(ToolOutcome::json(Value::Object(doc))),
            None => Ok(ToolOutcome::text(format!(
                "no document with id '{id}' in collection '{collection}'"
            ))),
        }
    }
}

/// Fetch documents matching an equality/`$regex` filter.
#[derive(Debug, Clone)]
pub struct FindDocumentsByFilterTool {
    store: DocumentStore,
}

impl FindDocumentsByFilterTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FindDocumentsByFilterTool {
    fn name(&self) -> &str {
        "find_documents_by_filter"
    }

    fn description(&self) -> &str {
        "Fetch every document matching a filter. Filter fields match by equality; \
         a string field may instead be matched with {\"$regex\": \"pattern\"}."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection to search" },
                "filter": { "type": "object", "description": "Field conditions, e.g. {\"city\": \"Lisbon\"}" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "filter", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        let filter = require_map(&arguments, "filter")?;
        match self.store.find_by_filter(identity, collection, &filter).await {
            Ok(docs) if docs.is_empty() => Ok(ToolOutcome::text(format!(
                "no documents in collection '{collection}' match the filter"
            ))),
            Ok(docs) => Ok(ToolOutcome::json(Value::Array(
                docs.into_iter().map(Value::Object).collect(),
            ))),
            Err(e) => Ok(store_failure(e)),
        }
    }
}

/// Overwrite fields of one document, selected by id.
#[derive(Debug, Clone)]
pub struct UpdateDocumentByIdTool {
    store: DocumentStore,
}

impl UpdateDocumentByIdTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateDocumentByIdTool {
    fn name(&self) -> &str {
        "update_document_by_id"
    }

    fn description(&self) -> &str {
        "Set the given fields on the document with the given id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection holding the document" },
                "document_id": { "type": "string", "description": "Id of the document to update" },
                "update_fields": { "type": "object", "description": "Fields and new values to set" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "document_id", "update_fields", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        let id = require_str(&arguments, "document_id")?;
        let fields = require_map(&arguments, "update_fields")?;
        match self
            .store
            .update_by_id(identity, collection, id, &fields)
            .await
        {
            1 => Ok(ToolOutcome::text(format!("updated document '{id}'"))),
            _ => Ok(ToolOutcome::text(format!(
                "no document with id '{id}' in collection '{collection}'"
            ))),
        }
    }
}

/// Overwrite fields of every document matching a filter.
#[derive(Debug, Clone)]
pub struct UpdateDocumentsByFilterTool {
    store: DocumentStore,
}

impl UpdateDocumentsByFilterTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateDocumentsByFilterTool {
    fn name(&self) -> &str {
        "update_documents_by_filter"
    }

    fn description(&self) -> &str {
        "Set the given fields on every document matching a filter."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection to update" },
                "filter": { "type": "object", "description": "Field conditions selecting documents" },
                "update_fields": { "type": "object", "description": "Fields and new values to set" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "filter", "update_fields", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        let filter = require_map(&arguments, "filter")?;
        let fields = require_map(&arguments, "update_fields")?;
        match self
            .store
            .update_by_filter(identity, collection, &filter, &fields)
            .await
        {
            Ok(0) => Ok(ToolOutcome::text(format!(
                "no documents in collection '{collection}' matched the filter"
            ))),
            Ok(n) => Ok(ToolOutcome::text(format!(
                "updated {n} document(s) in collection '{collection}'"
            ))),
            Err(e) => Ok(store_failure(e)),
        }
    }
}

/// Delete one document by id.
#[derive(Debug, Clone)]
pub struct DeleteDocumentByIdTool {
    store: DocumentStore,
}

impl DeleteDocumentByIdTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteDocumentByIdTool {
    fn name(&self) -> &str {
        "delete_document_by_id"
    }

    fn description(&self) -> &str {
        "Delete the document with the given id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection holding the document" },
                "document_id": { "type": "string", "description": "Id of the document to delete" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "document_id", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        let id = require_str(&arguments, "document_id")?;
        match self.store.delete_by_id(identity, collection, id).await {
            1 => Ok(ToolOutcome::text(format!("deleted document '{id}'"))),
            _ => Ok(ToolOutcome::text(format!(
                "no document with id '{id}' in collection '{collection}'"
            ))),
        }
    }
}

/// Delete every document matching a filter.
#[derive(Debug, Clone)]
pub struct DeleteDocumentsByFilterTool {
    store: DocumentStore,
}

impl DeleteDocumentsByFilterTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteDocumentsByFilterTool {
    fn name(&self) -> &str {
        "delete_documents_by_filter"
    }

    fn description(&self) -> &str {
        "Delete every document matching a filter. An empty filter deletes every document."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection to delete from" },
                "filter": { "type": "object", "description": "Field conditions selecting documents" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "filter", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        let filter = require_map(&arguments, "filter")?;
        match self
            .store
            .delete_by_filter(identity, collection, &filter)
            .await
        {
            Ok(0) => Ok(ToolOutcome::text(format!(
                "no documents in collection '{collection}' matched the filter"
            ))),
            Ok(n) => Ok(ToolOutcome::text(format!(
                "deleted {n} document(s) from collection '{collection}'"
            ))),
            Err(e) => Ok(store_failure(e)),
        }
    }
}

/// Count documents, optionally restricted by a filter.
#[derive(Debug, Clone)]
pub struct CountDocumentsTool {
    store: DocumentStore,
}

impl CountDocumentsTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CountDocumentsTool {
    fn name(&self) -> &str {
        "count_documents"
    }

    fn description(&self) -> &str {
        "Count documents in a collection, optionally restricted by a filter."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection to count" },
                "filter": { "type": "object", "description": "Optional field conditions; omit to count everything" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        let filter = optional_map(&arguments, "filter")?;
        match self.store.count(identity, collection, &filter).await {
            Ok(n) => Ok(ToolOutcome::text(format!(
                "collection '{collection}' has {n} matching document(s)"
            ))),
            Err(e) => Ok(store_failure(e)),
        }
    }
}

/// Fetch every document in a collection.
#[derive(Debug, Clone)]
pub struct GetAllDocumentsTool {
    store: DocumentStore,
}

impl GetAllDocumentsTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetAllDocumentsTool {
    fn name(&self) -> &str {
        "get_all_documents"
    }

    fn description(&self) -> &str {
        "Fetch every document in a collection."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection to read" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        let docs = self.store.get_all(identity, collection).await;
        if docs.is_empty() {
            Ok(ToolOutcome::text(format!(
                "collection '{collection}' is empty"
            )))
        } else {
            Ok(ToolOutcome::json(Value::Array(
                docs.into_iter().map(Value::Object).collect(),
            )))
        }
    }
}

/// Report the collection's inferred schema as field-name to type-tag pairs.
#[derive(Debug, Clone)]
pub struct GetCollectionSchemaTool {
    store: DocumentStore,
}

impl GetCollectionSchemaTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetCollectionSchemaTool {
    fn name(&self) -> &str {
        "get_collection_schema"
    }

    fn description(&self) -> &str {
        "Report the collection's schema as field names and type tags \
         (string, integer, float, boolean, list, map)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection to inspect" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        match self.store.schema(identity, collection).await {
            Ok(Some(schema)) => {
                let rendered = serde_json::to_value(&schema)
                    .map_err(|e| DocentError::serialization(e.to_string()))?;
                Ok(ToolOutcome::json(rendered))
            }
            Ok(None) => Ok(ToolOutcome::text(format!(
                "collection '{collection}' is empty, so no schema can be inferred yet"
            ))),
            Err(e) => Ok(store_failure(e)),
        }
    }
}

/// List the caller's collections.
#[derive(Debug, Clone)]
pub struct ListCollectionsTool {
    store: DocumentStore,
}

impl ListCollectionsTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListCollectionsTool {
    fn name(&self) -> &str {
        "list_collections"
    }

    fn description(&self) -> &str {
        "List the names of every collection in the caller's database."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let names = self.store.list_collections(identity).await;
        if names.is_empty() {
            Ok(ToolOutcome::text("no collections exist yet"))
        } else {
            Ok(ToolOutcome::json(json!(names)))
        }
    }
}

/// Add fields to every document so the schema baseline grows.
///
/// This is the sanctioned way out of a schema violation on insert: stamp the
/// new fields onto all existing documents, then retry the insert.
#[derive(Debug, Clone)]
pub struct ExtendCollectionSchemaTool {
    store: DocumentStore,
}

impl ExtendCollectionSchemaTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ExtendCollectionSchemaTool {
    fn name(&self) -> &str {
        "extend_collection_schema"
    }

    fn description(&self) -> &str {
        "Add new fields (with default values) to every document in a collection, \
         widening the schema so future inserts may carry them."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection to widen" },
                "new_fields": { "type": "object", "description": "New fields and their default values" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "new_fields", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        let new_fields = require_map(&arguments, "new_fields")?;
        match self
            .store
            .extend_schema(identity, collection, &new_fields)
            .await
        {
            Ok(outcome) if outcome.seeded => Ok(ToolOutcome::text(format!(
                "collection '{collection}' was empty; seeded it with one document carrying the new fields"
            ))),
            Ok(outcome) => Ok(ToolOutcome::text(format!(
                "added the new fields to {} document(s) in collection '{collection}'",
                outcome.modified
            ))),
            Err(e) => Ok(store_failure(e)),
        }
    }
}

/// Drop a collection and everything in it.
#[derive(Debug, Clone)]
pub struct DropCollectionTool {
    store: DocumentStore,
}

impl DropCollectionTool {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DropCollectionTool {
    fn name(&self) -> &str {
        "drop_collection"
    }

    fn description(&self) -> &str {
        "Delete a collection and every document in it. This cannot be undone."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection": { "type": "string", "description": "Collection to drop" },
                "identity": { "type": "string", "description": "Identity of the data owner; the runtime always sets this" }
            },
            "required": ["collection", "identity"]
        })
    }

    async fn execute(&self, arguments: Value) -> crate::Result<ToolOutcome> {
        let identity = caller(&arguments)?;
        let collection = require_str(&arguments, "collection")?;
        match self.store.drop_collection(identity, collection).await {
            Ok(()) => Ok(ToolOutcome::text(format!(
                "dropped collection '{collection}'"
            ))),
            Err(e) => Ok(store_failure(e)),
        }
    }
}
