use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::tree::DocumentTree;
use super::{CommitReceipt, DocumentStore, ServerClock, WriteBatch, timestamp_value};
use crate::error::{StoreError, StoreResult};
use crate::types::{CollectionPath, DocPath, Document, DocumentSnapshot};

type RejectRule = Box<dyn Fn(&WriteBatch) -> Option<String> + Send>;

/// Process-local document store.
///
/// Reference implementation of the store contract. Fixtures are seeded with
/// [`insert`](Self::insert); commit failures can be injected with
/// [`reject_commits_where`](Self::reject_commits_where) to exercise per-record
/// error isolation.
pub struct InMemoryStore {
    tree: Mutex<DocumentTree>,
    clock: ServerClock,
    reject: Mutex<Option<RejectRule>>,
    commits: Mutex<usize>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(ServerClock::System)
    }

    #[must_use]
    pub fn with_clock(clock: ServerClock) -> Self {
        Self {
            tree: Mutex::new(DocumentTree::default()),
            clock,
            reject: Mutex::new(None),
            commits: Mutex::new(0),
        }
    }

    /// Seed a document directly, bypassing batches and the commit counter.
    pub fn insert(&self, path: DocPath, data: Document) -> StoreResult<()> {
        self.tree()?.insert(path, data);
        Ok(())
    }

    /// Every stored document keyed by full path.
    pub fn dump(&self) -> StoreResult<BTreeMap<DocPath, Document>> {
        Ok(self.tree()?.dump())
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> StoreResult<usize> {
        self.commits
            .lock()
            .map(|count| *count)
            .map_err(|_| StoreError::Poisoned)
    }

    /// Fail every commit for which `rule` returns `true`.
    pub fn reject_commits_where<F>(&self, rule: F) -> StoreResult<()>
    where
        F: Fn(&WriteBatch) -> bool + Send + 'static,
    {
        let boxed: RejectRule =
            Box::new(move |batch| rule(batch).then(|| "injected commit failure".to_string()));
        *self.reject.lock().map_err(|_| StoreError::Poisoned)? = Some(boxed);
        Ok(())
    }

    fn tree(&self) -> StoreResult<MutexGuard<'_, DocumentTree>> {
        self.tree.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl DocumentStore for InMemoryStore {
    fn list(&self, collection: &CollectionPath) -> StoreResult<Vec<DocumentSnapshot>> {
        Ok(self.tree()?.list(collection))
    }

    fn get(&self, path: &DocPath) -> StoreResult<Option<DocumentSnapshot>> {
        Ok(self
            .tree()?
            .get(path)
            .map(|data| DocumentSnapshot::new(path.clone(), data.clone())))
    }

    fn find_first(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &Value,
    ) -> StoreResult<Option<DocumentSnapshot>> {
        Ok(self.tree()?.find_first(collection, field, value))
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReceipt> {
        if let Some(rule) = self.reject.lock().map_err(|_| StoreError::Poisoned)?.as_ref() {
            if let Some(reason) = rule(&batch) {
                tracing::debug!(batch.ops = batch.len(), %reason, "commit rejected");
                return Err(StoreError::Rejected(reason));
            }
        }

        let committed_at = self.clock.now();
        let mut tree = self.tree()?;
        let staged = tree.stage(batch.ops(), &timestamp_value(committed_at))?;
        tree.apply_staged(staged);
        drop(tree);

        *self.commits.lock().map_err(|_| StoreError::Poisoned)? += 1;
        tracing::debug!(batch.ops = batch.len(), "batch committed");
        Ok(CommitReceipt {
            committed_at,
            ops: batch.len(),
        })
    }
}
