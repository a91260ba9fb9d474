//! Document-store contract and the bundled implementations.
//!
//! The engine only needs five things from a store: list a collection, get one document,
//! find the first document with a field equal to a value, address sub-collections, and
//! commit a batch of writes atomically. Both implementations share the staging logic in
//! `tree`, so sentinel resolution and merge semantics are identical between them.

mod journaled;
mod memory;
mod tree;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use journaled::JournaledStore;
pub use memory::InMemoryStore;

use crate::error::StoreResult;
use crate::types::{CollectionPath, DocPath, DocumentSnapshot, Payload};

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    /// Create or fully overwrite.
    Set { path: DocPath, fields: Payload },
    /// Create or deep-merge into the existing document.
    Merge { path: DocPath, fields: Payload },
    /// Replace individual top-level fields of an existing document.
    Update { path: DocPath, fields: Payload },
    Delete { path: DocPath },
}

impl WriteOp {
    #[must_use]
    pub fn path(&self) -> &DocPath {
        match self {
            Self::Set { path, .. }
            | Self::Merge { path, .. }
            | Self::Update { path, .. }
            | Self::Delete { path } => path,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Merge { .. } => "merge",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Ordered list of writes committed as one indivisible unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn set(&mut self, path: DocPath, fields: Payload) -> &mut Self {
        self.push(WriteOp::Set { path, fields })
    }

    pub fn merge(&mut self, path: DocPath, fields: Payload) -> &mut Self {
        self.push(WriteOp::Merge { path, fields })
    }

    pub fn update(&mut self, path: DocPath, fields: Payload) -> &mut Self {
        self.push(WriteOp::Update { path, fields })
    }

    pub fn delete(&mut self, path: DocPath) -> &mut Self {
        self.push(WriteOp::Delete { path })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    #[must_use]
    pub fn touches(&self, path: &DocPath) -> bool {
        self.ops.iter().any(|op| op.path() == path)
    }

    /// Empties the batch, handing back its operations.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Instant every server-timestamp sentinel in the batch resolved to.
    pub committed_at: DateTime<Utc>,
    pub ops: usize,
}

/// Source of the server-side commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerClock {
    #[default]
    System,
    /// Every commit resolves timestamps to this instant; makes replays comparable.
    Fixed(DateTime<Utc>),
}

impl ServerClock {
    #[must_use]
    pub fn now(self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(instant) => instant,
        }
    }
}

pub(crate) fn timestamp_value(instant: DateTime<Utc>) -> Value {
    Value::String(instant.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Transactional document API consumed by the migration passes.
///
/// Methods take `&self`; implementations serialize access internally so the agent
/// resolver and the batch applier can share one store handle.
pub trait DocumentStore {
    /// Every document directly in `collection`, ordered by document id.
    fn list(&self, collection: &CollectionPath) -> StoreResult<Vec<DocumentSnapshot>>;

    fn get(&self, path: &DocPath) -> StoreResult<Option<DocumentSnapshot>>;

    /// First document (by id) in `collection` whose top-level `field` equals `value`.
    fn find_first(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &Value,
    ) -> StoreResult<Option<DocumentSnapshot>>;

    /// Apply every operation in `batch` or none of them.
    fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReceipt>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn list(&self, collection: &CollectionPath) -> StoreResult<Vec<DocumentSnapshot>> {
        (**self).list(collection)
    }

    fn get(&self, path: &DocPath) -> StoreResult<Option<DocumentSnapshot>> {
        (**self).get(path)
    }

    fn find_first(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &Value,
    ) -> StoreResult<Option<DocumentSnapshot>> {
        (**self).find_first(collection, field, value)
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReceipt> {
        (**self).commit(batch)
    }
}
