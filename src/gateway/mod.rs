//! Document store gateway.
//!
//! The channel subsystem does not own its persistence. Everything it reads or
//! writes goes through [`StoreGateway`], a small document-store contract:
//!
//! - per-collection documents addressed by string IDs
//! - field-level merge updates that fail on absent documents
//! - equality-filtered queries
//! - multi-document atomic deletes
//! - live subscriptions that emit the full current result set
//!
//! [`MemoryStore`] is the in-process implementation used by tests and
//! embedders that don't need durability.

mod memory;

pub use memory::{MemoryStore, MemoryStoreConfig, Operation};

use crate::error::{DirectoryError, GatewayError, GatewayResult, Result};
use crate::subscriptions::{GatewaySubscription, SubscriptionId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// Field map of a document.
pub type Fields = serde_json::Map<String, Value>;

/// A stored document.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Deserialize the document's fields.
    pub fn decode<T: DeserializeOwned>(&self) -> GatewayResult<T> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

/// Address of a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub collection: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

/// Equality-filtered query over one collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    /// Ascending sort field (None = store order).
    pub order_by: Option<String>,
}

impl Query {
    /// Match every document in a collection.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    /// Require `field == value`.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Check if a document's fields satisfy every filter.
    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| fields.get(field) == Some(value))
    }

    /// Sort documents by `order_by`, keeping store order for ties.
    pub fn sort(&self, documents: &mut [Document]) {
        if let Some(ref field) = self.order_by {
            documents.sort_by(|a, b| compare_values(a.fields.get(field), b.fields.get(field)));
        }
    }
}

/// Total order over optional JSON scalars. Missing values sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Serialize a value into a document field map.
pub fn to_fields<T: Serialize>(value: &T) -> GatewayResult<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(GatewayError::Serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Decode a document into a domain type, reporting which record was bad.
pub(crate) fn decode_document<T: DeserializeOwned>(collection: &str, doc: &Document) -> Result<T> {
    doc.decode().map_err(|e| DirectoryError::MalformedDocument {
        collection: collection.to_string(),
        id: doc.id.clone(),
        reason: e.to_string(),
    })
}

/// Document store contract consumed by the channel subsystem.
///
/// Timeouts and retries are the implementation's concern; callers treat every
/// error as final.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Read one document.
    async fn get(&self, collection: &str, id: &str) -> GatewayResult<Option<Document>>;

    /// Run an equality query.
    async fn query(&self, query: &Query) -> GatewayResult<Vec<Document>>;

    /// Write a document. With an ID this replaces any existing document
    /// (upsert); without one the store assigns a fresh ID.
    async fn create(&self, collection: &str, fields: Fields, id: Option<&str>)
        -> GatewayResult<String>;

    /// Merge fields into an existing document. Fails with `NotFound` if the
    /// document does not exist.
    async fn update_merge(&self, collection: &str, id: &str, fields: Fields) -> GatewayResult<()>;

    /// Delete a document. Deleting an absent document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> GatewayResult<()>;

    /// Delete every referenced document, or none of them.
    async fn atomic_batch_delete(&self, refs: &[DocumentRef]) -> GatewayResult<()>;

    /// Subscribe to the live result set of a query. The current result set
    /// is delivered first.
    async fn subscribe(&self, query: &Query) -> GatewayResult<GatewaySubscription>;

    /// Stop a subscription. Unknown IDs are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document {
        match value {
            Value::Object(fields) => Document::new(id, fields),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_query_matches_all_filters() {
        let query = Query::collection("memberships")
            .where_eq("channel_id", "c1")
            .where_eq("role", "owner");

        let owner = doc("a", json!({"channel_id": "c1", "role": "owner"}));
        let member = doc("b", json!({"channel_id": "c1", "role": "member"}));
        let other = doc("c", json!({"channel_id": "c2", "role": "owner"}));

        assert!(query.matches(&owner.fields));
        assert!(!query.matches(&member.fields));
        assert!(!query.matches(&other.fields));
    }

    #[test]
    fn test_query_sort_is_stable() {
        let query = Query::collection("messages").order_by("timestamp");
        let mut docs = vec![
            doc("m3", json!({"timestamp": 30})),
            doc("m1", json!({"timestamp": 10})),
            doc("m2a", json!({"timestamp": 20})),
            doc("m2b", json!({"timestamp": 20})),
            doc("m0", json!({})),
        ];
        query.sort(&mut docs);

        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2a", "m2b", "m3"]);
    }

    #[test]
    fn test_to_fields_rejects_scalars() {
        assert!(to_fields(&json!({"a": 1})).is_ok());
        assert!(matches!(
            to_fields(&42),
            Err(GatewayError::Serialization(_))
        ));
    }
}
