//! Document addressing and write payload values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stored document body.
pub type Document = Map<String, Value>;

/// Field name to value, as written by a batch operation.
pub type Payload = BTreeMap<String, FieldValue>;

/// Address of a collection: `name` at the root, or `parent/…/name` under a document.
///
/// Segments alternate collection/document, so a collection path always has an odd count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(Vec<String>);

/// Address of a single document: its collection plus the document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocPath(Vec<String>);

impl CollectionPath {
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    #[must_use]
    pub fn doc(&self, id: impl Into<String>) -> DocPath {
        let mut segments = self.0.clone();
        segments.push(id.into());
        DocPath(segments)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    /// Owning document for sub-collections, `None` for root collections.
    #[must_use]
    pub fn parent(&self) -> Option<DocPath> {
        if self.0.len() < 3 {
            return None;
        }
        Some(DocPath(self.0[..self.0.len() - 1].to_vec()))
    }
}

impl DocPath {
    #[must_use]
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self(vec![collection.into(), id.into()])
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    #[must_use]
    pub fn collection(&self) -> CollectionPath {
        CollectionPath(self.0[..self.0.len().saturating_sub(1)].to_vec())
    }

    /// Sub-collection scoped under this document.
    #[must_use]
    pub fn sub(&self, name: impl Into<String>) -> CollectionPath {
        let mut segments = self.0.clone();
        segments.push(name.into());
        CollectionPath(segments)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Value of a single payload field.
///
/// The two sentinels are resolved by the store at commit time: every `ServerTimestamp`
/// in one batch receives the same commit instant, `Delete` removes the field on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Value(Value),
    ServerTimestamp,
    Delete,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// A document read from the store together with its address.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub path: DocPath,
    pub data: Document,
}

impl DocumentSnapshot {
    #[must_use]
    pub fn new(path: DocPath, data: Document) -> Self {
        Self { path, data }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.path.id()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// String field, with empty strings treated as absent.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data
            .get(field)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Converts a plain document into a payload of concrete values.
#[must_use]
pub fn payload_from_document(document: Document) -> Payload {
    document
        .into_iter()
        .map(|(key, value)| (key, FieldValue::Value(value)))
        .collect()
}
