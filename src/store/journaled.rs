use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tree::DocumentTree;
use super::{CommitReceipt, DocumentStore, ServerClock, WriteBatch, WriteOp, timestamp_value};
use crate::error::{StoreError, StoreResult};
use crate::io::journal::{Journal, JournalStats};
use crate::types::{CollectionPath, DocPath, DocumentSnapshot};

/// Serialized form of one committed batch.
#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    committed_at: DateTime<Utc>,
    ops: Vec<WriteOp>,
}

struct State {
    tree: DocumentTree,
    journal: Journal,
}

/// Single-file document store: an in-memory tree rebuilt from a checksummed journal.
///
/// A batch is validated against the tree, written to the journal as one record, and
/// only then applied in memory. The file is locked exclusively while the store is open.
pub struct JournaledStore {
    path: PathBuf,
    clock: ServerClock,
    state: Mutex<State>,
}

impl std::fmt::Debug for JournaledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournaledStore")
            .field("path", &self.path)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl JournaledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::open_with_clock(path, ServerClock::System)
    }

    pub fn open_with_clock<P: AsRef<Path>>(path: P, clock: ServerClock) -> StoreResult<Self> {
        let path = path.as_ref();
        let (journal, records) = Journal::open(path)?;

        let mut tree = DocumentTree::default();
        for record in &records {
            let entry: JournalEntry = serde_json::from_slice(&record.payload).map_err(|err| {
                StoreError::JournalCorruption {
                    offset: record.offset,
                    reason: format!("undecodable batch: {err}"),
                }
            })?;
            let staged = tree
                .stage(&entry.ops, &timestamp_value(entry.committed_at))
                .map_err(|err| StoreError::JournalCorruption {
                    offset: record.offset,
                    reason: format!("batch no longer applies: {err}"),
                })?;
            tree.apply_staged(staged);
        }
        tracing::info!(
            store.path = %path.display(),
            store.batches = records.len(),
            "journaled store opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            clock,
            state: Mutex::new(State { tree, journal }),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn journal_stats(&self) -> StoreResult<JournalStats> {
        Ok(self.state()?.journal.stats())
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl DocumentStore for JournaledStore {
    fn list(&self, collection: &CollectionPath) -> StoreResult<Vec<DocumentSnapshot>> {
        Ok(self.state()?.tree.list(collection))
    }

    fn get(&self, path: &DocPath) -> StoreResult<Option<DocumentSnapshot>> {
        Ok(self
            .state()?
            .tree
            .get(path)
            .map(|data| DocumentSnapshot::new(path.clone(), data.clone())))
    }

    fn find_first(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &Value,
    ) -> StoreResult<Option<DocumentSnapshot>> {
        Ok(self.state()?.tree.find_first(collection, field, value))
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReceipt> {
        let committed_at = self.clock.now();
        let ops = batch.len();
        let mut state = self.state()?;

        let staged = state
            .tree
            .stage(batch.ops(), &timestamp_value(committed_at))?;
        if ops > 0 {
            let entry = JournalEntry {
                committed_at,
                ops: batch.ops().to_vec(),
            };
            let payload = serde_json::to_vec(&entry)?;
            let sequence = state.journal.append(&payload)?;
            tracing::debug!(journal.sequence = sequence, batch.ops = ops, "batch journaled");
        }
        state.tree.apply_staged(staged);

        Ok(CommitReceipt { committed_at, ops })
    }
}
