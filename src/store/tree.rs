//! In-memory document tree plus two-phase batch application.
//!
//! `stage` validates a whole batch against the current state without touching it;
//! `apply_staged` then swaps the results in. A batch that fails to stage leaves the
//! tree untouched.

use std::collections::BTreeMap;

use serde_json::Value;

use super::WriteOp;
use crate::constants::MAX_BATCH_OPS;
use crate::error::{StoreError, StoreResult};
use crate::types::{CollectionPath, DocPath, Document, DocumentSnapshot, FieldValue, Payload};

/// Post-batch state of every touched document; `None` means deleted.
pub(crate) type Staged = BTreeMap<DocPath, Option<Document>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DocumentTree {
    collections: BTreeMap<CollectionPath, BTreeMap<String, Document>>,
}

impl DocumentTree {
    pub(crate) fn get(&self, path: &DocPath) -> Option<&Document> {
        self.collections
            .get(&path.collection())
            .and_then(|docs| docs.get(path.id()))
    }

    pub(crate) fn list(&self, collection: &CollectionPath) -> Vec<DocumentSnapshot> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| {
                        DocumentSnapshot::new(collection.doc(id.clone()), data.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn find_first(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &Value,
    ) -> Option<DocumentSnapshot> {
        self.collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|(_, data)| data.get(field) == Some(value))
                .map(|(id, data)| DocumentSnapshot::new(collection.doc(id.clone()), data.clone()))
        })
    }

    /// All documents keyed by full path, sub-collections included.
    pub(crate) fn dump(&self) -> BTreeMap<DocPath, Document> {
        self.collections
            .iter()
            .flat_map(|(collection, docs)| {
                docs.iter()
                    .map(move |(id, data)| (collection.doc(id.clone()), data.clone()))
            })
            .collect()
    }

    pub(crate) fn insert(&mut self, path: DocPath, data: Document) {
        self.collections
            .entry(path.collection())
            .or_default()
            .insert(path.id().to_string(), data);
    }

    fn remove(&mut self, path: &DocPath) {
        let collection = path.collection();
        if let Some(docs) = self.collections.get_mut(&collection) {
            docs.remove(path.id());
            if docs.is_empty() {
                self.collections.remove(&collection);
            }
        }
    }

    /// Compute the post-batch state of every touched document.
    pub(crate) fn stage(&self, ops: &[WriteOp], timestamp: &Value) -> StoreResult<Staged> {
        if ops.len() > MAX_BATCH_OPS {
            return Err(StoreError::BatchTooLarge {
                ops: ops.len(),
                max: MAX_BATCH_OPS,
            });
        }

        let mut staged = Staged::new();
        for op in ops {
            let current = match staged.get(op.path()) {
                Some(entry) => entry.clone(),
                None => self.get(op.path()).cloned(),
            };
            let next = match op {
                WriteOp::Set { path, fields } => Some(resolve_set(path, fields, timestamp)?),
                WriteOp::Merge { fields, .. } => {
                    let mut doc = current.unwrap_or_default();
                    merge_into(&mut doc, fields, timestamp);
                    Some(doc)
                }
                WriteOp::Update { path, fields } => {
                    let Some(mut doc) = current else {
                        return Err(StoreError::NotFound { path: path.clone() });
                    };
                    update_into(&mut doc, fields, timestamp);
                    Some(doc)
                }
                WriteOp::Delete { .. } => None,
            };
            staged.insert(op.path().clone(), next);
        }
        Ok(staged)
    }

    pub(crate) fn apply_staged(&mut self, staged: Staged) {
        for (path, doc) in staged {
            match doc {
                Some(data) => self.insert(path, data),
                None => self.remove(&path),
            }
        }
    }
}

fn resolve_set(path: &DocPath, fields: &Payload, timestamp: &Value) -> StoreResult<Document> {
    let mut doc = Document::new();
    for (key, value) in fields {
        match value {
            FieldValue::Value(v) => {
                doc.insert(key.clone(), v.clone());
            }
            FieldValue::ServerTimestamp => {
                doc.insert(key.clone(), timestamp.clone());
            }
            FieldValue::Delete => {
                return Err(StoreError::Rejected(format!(
                    "delete sentinel on field `{key}` of {path} is only valid in merge or update"
                )));
            }
        }
    }
    Ok(doc)
}

fn merge_into(doc: &mut Document, fields: &Payload, timestamp: &Value) {
    for (key, value) in fields {
        match value {
            FieldValue::Value(incoming) => match doc.get_mut(key) {
                Some(existing) => deep_merge(existing, incoming),
                None => {
                    doc.insert(key.clone(), incoming.clone());
                }
            },
            FieldValue::ServerTimestamp => {
                doc.insert(key.clone(), timestamp.clone());
            }
            FieldValue::Delete => {
                doc.remove(key);
            }
        }
    }
}

fn update_into(doc: &mut Document, fields: &Payload, timestamp: &Value) {
    for (key, value) in fields {
        match value {
            FieldValue::Value(v) => {
                doc.insert(key.clone(), v.clone());
            }
            FieldValue::ServerTimestamp => {
                doc.insert(key.clone(), timestamp.clone());
            }
            FieldValue::Delete => {
                doc.remove(key);
            }
        }
    }
}

/// Maps merge key by key; anything else is replaced.
fn deep_merge(existing: &mut Value, incoming: &Value) {
    match (existing, incoming) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (k, FieldValue::Value(v)))
                .collect(),
            _ => Payload::new(),
        }
    }

    fn ts() -> Value {
        json!("2026-10-19T08:00:00.000000Z")
    }

    #[test]
    fn merge_keeps_untouched_fields_and_merges_maps() {
        let path = DocPath::new("sales_agents", "A1");
        let mut tree = DocumentTree::default();
        tree.insert(
            path.clone(),
            payload_doc(json!({"name": "Ann", "stats": {"orders": 2, "region": "north"}})),
        );

        let ops = vec![WriteOp::Merge {
            path: path.clone(),
            fields: payload(json!({"stats": {"orders": 3}, "active": true})),
        }];
        let staged = tree.stage(&ops, &ts()).expect("stage");
        tree.apply_staged(staged);

        let doc = tree.get(&path).expect("doc");
        assert_eq!(
            Value::Object(doc.clone()),
            json!({"name": "Ann", "active": true, "stats": {"orders": 3, "region": "north"}})
        );
    }

    #[test]
    fn failed_stage_leaves_tree_untouched() {
        let existing = DocPath::new("customers", "C1");
        let missing = DocPath::new("customers", "C2");
        let mut tree = DocumentTree::default();
        tree.insert(existing.clone(), payload_doc(json!({"name": "Acme"})));
        let before = tree.clone();

        let ops = vec![
            WriteOp::Set {
                path: existing.clone(),
                fields: payload(json!({"name": "Changed"})),
            },
            WriteOp::Update {
                path: missing.clone(),
                fields: payload(json!({"x": 1})),
            },
        ];
        let err = tree.stage(&ops, &ts()).expect_err("update of missing doc");
        assert!(matches!(err, StoreError::NotFound { path } if path == missing));
        assert_eq!(tree, before);
    }

    #[test]
    fn sentinels_resolve_per_operation_kind() {
        let path = DocPath::new("customers", "C1");
        let mut tree = DocumentTree::default();
        tree.insert(path.clone(), payload_doc(json!({"sales": {"a": 1}, "name": "Acme"})));

        let mut fields = Payload::new();
        fields.insert("sales".into(), FieldValue::Delete);
        fields.insert("touched".into(), FieldValue::ServerTimestamp);
        let staged = tree
            .stage(&[WriteOp::Update { path: path.clone(), fields }], &ts())
            .expect("stage update");
        tree.apply_staged(staged);
        assert_eq!(
            Value::Object(tree.get(&path).cloned().expect("doc")),
            json!({"name": "Acme", "touched": "2026-10-19T08:00:00.000000Z"})
        );

        let mut bad = Payload::new();
        bad.insert("name".into(), FieldValue::Delete);
        let err = tree
            .stage(&[WriteOp::Set { path, fields: bad }], &ts())
            .expect_err("delete sentinel in set");
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[test]
    fn later_ops_see_earlier_ops_in_same_batch() {
        let path = DocPath::new("sales_orders", "SO-1");
        let tree = DocumentTree::default();
        let ops = vec![
            WriteOp::Set {
                path: path.clone(),
                fields: payload(json!({"total": 10})),
            },
            WriteOp::Update {
                path: path.clone(),
                fields: payload(json!({"status": "open"})),
            },
        ];
        let staged = tree.stage(&ops, &ts()).expect("stage");
        assert_eq!(
            staged.get(&path).cloned().flatten().map(Value::Object),
            Some(json!({"total": 10, "status": "open"}))
        );
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let tree = DocumentTree::default();
        let ops: Vec<WriteOp> = (0..=MAX_BATCH_OPS)
            .map(|i| WriteOp::Delete {
                path: DocPath::new("customers", format!("C{i}")),
            })
            .collect();
        let err = tree.stage(&ops, &ts()).expect_err("too many ops");
        assert!(matches!(err, StoreError::BatchTooLarge { ops, max } if ops == 501 && max == 500));
    }

    fn payload_doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }
}
