//! Metadata filter builder.
//!
//! Every filter starts from [`MetadataFilter::for_user`], which pins both
//! the owning `userId` and the `type = "vectorized_document"` discriminator.
//! There is no other constructor, so a query or delete issued through this
//! crate cannot be unscoped across tenants.
//!
//! Filters serialize to the Pinecone-style JSON filter language
//! (`{"field": {"$eq": value}}`, clauses implicitly AND-ed) and can also be
//! evaluated locally against a [`RecordMetadata`] for in-memory stores.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::models::{RecordMetadata, RECORD_TYPE};

/// A single comparison on one metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Gte(f64),
}

impl Condition {
    fn to_json(&self) -> Value {
        match self {
            Condition::Eq(v) => json!({ "$eq": v }),
            Condition::Gte(n) => json!({ "$gte": n }),
        }
    }

    fn matches(&self, actual: Option<&Value>) -> bool {
        match (self, actual) {
            (Condition::Eq(expected), Some(v)) => v == expected,
            (Condition::Gte(min), Some(v)) => v.as_f64().map(|n| n >= *min).unwrap_or(false),
            (_, None) => false,
        }
    }
}

/// Conjunction of field conditions, always scoped to one user.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    clauses: BTreeMap<&'static str, Condition>,
}

impl MetadataFilter {
    /// All of this system's records owned by `user_id`.
    pub fn for_user(user_id: &str) -> Self {
        let mut clauses = BTreeMap::new();
        clauses.insert("userId", Condition::Eq(json!(user_id)));
        clauses.insert("type", Condition::Eq(json!(RECORD_TYPE)));
        Self { clauses }
    }

    pub fn document(mut self, document_id: &str) -> Self {
        self.clauses
            .insert("documentId", Condition::Eq(json!(document_id)));
        self
    }

    pub fn file_name(mut self, file_name: &str) -> Self {
        self.clauses.insert("fileName", Condition::Eq(json!(file_name)));
        self
    }

    /// Restrict to metadata records (`true`) or content records (`false`).
    pub fn metadata_records(mut self, is_metadata: bool) -> Self {
        self.clauses
            .insert("isMetadata", Condition::Eq(json!(is_metadata)));
        self
    }

    /// Content records whose `chunkIndex` is at least `min`.
    pub fn chunk_index_at_least(mut self, min: usize) -> Self {
        self.clauses.insert("chunkIndex", Condition::Gte(min as f64));
        self
    }

    /// The owning user this filter is scoped to.
    pub fn user_id(&self) -> Option<&str> {
        match self.clauses.get("userId") {
            Some(Condition::Eq(v)) => v.as_str(),
            _ => None,
        }
    }

    /// Serialize to the store's JSON filter language.
    pub fn to_json(&self) -> Value {
        let map = self
            .clauses
            .iter()
            .map(|(k, c)| (k.to_string(), c.to_json()))
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }

    /// Evaluate against a record's metadata.
    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        let value = match serde_json::to_value(metadata) {
            Ok(v) => v,
            Err(_) => return false,
        };
        self.clauses
            .iter()
            .all(|(field, cond)| cond.matches(value.get(*field)))
    }
}
