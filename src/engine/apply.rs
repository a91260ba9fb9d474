use crate::constants::MAX_BATCH_OPS;
use crate::error::{ApplyError, StoreError};
use crate::store::{DocumentStore, WriteBatch, WriteOp};
use crate::types::WritePlan;

/// Commits a [`WritePlan`] as one all-or-nothing batch.
#[derive(Debug)]
pub struct AtomicBatchApplier<S> {
    store: S,
}

impl<S: DocumentStore> AtomicBatchApplier<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Parent `Set`, one `Set` per child, then the link `Merge` if present.
    #[must_use]
    pub fn batch_for(plan: WritePlan) -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch.set(plan.parent, plan.parent_fields);
        for child in plan.children {
            batch.set(child.path, child.fields);
        }
        if let Some(link) = plan.link {
            batch.merge(link.path, link.fields);
        }
        batch
    }

    /// Either every write in the plan becomes visible or none does. No partial retry.
    pub fn apply(&self, plan: WritePlan) -> Result<(), ApplyError> {
        let parent = plan.parent.clone();
        let batch = Self::batch_for(plan);
        let ops = batch.len();

        match self.store.commit(batch) {
            Ok(receipt) => {
                tracing::debug!(
                    order.id = parent.id(),
                    batch.ops = receipt.ops,
                    batch.committed_at = %receipt.committed_at,
                    "write plan committed"
                );
                Ok(())
            }
            Err(source) => {
                tracing::error!(
                    order.id = parent.id(),
                    batch.ops = ops,
                    error = %source,
                    "write plan rejected"
                );
                Err(ApplyError { parent, source })
            }
        }
    }
}

/// Result of committing one chunk of a bulk pass.
#[derive(Debug)]
pub enum ChunkOutcome {
    Committed(usize),
    Failed { ops: usize, error: StoreError },
}

/// Accumulates independent writes and commits them in bounded chunks.
///
/// Unlike [`AtomicBatchApplier`], chunks are unrelated: one failing chunk leaves the
/// others committed.
#[derive(Debug)]
pub struct ChunkedWriter<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    chunk_size: usize,
    pending: WriteBatch,
}

impl<'s, S: DocumentStore + ?Sized> ChunkedWriter<'s, S> {
    /// `chunk_size` is clamped to `1..=MAX_BATCH_OPS`.
    pub fn new(store: &'s S, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.clamp(1, MAX_BATCH_OPS),
            pending: WriteBatch::new(),
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Queues `op`, committing the chunk once it is full.
    pub fn push(&mut self, op: WriteOp) -> Option<ChunkOutcome> {
        self.pending.push(op);
        if self.pending.len() >= self.chunk_size {
            self.flush()
        } else {
            None
        }
    }

    /// Commits whatever is queued; `None` when nothing was.
    pub fn flush(&mut self) -> Option<ChunkOutcome> {
        if self.pending.is_empty() {
            return None;
        }
        let batch = self.pending.take();
        let ops = batch.len();
        Some(match self.store.commit(batch) {
            Ok(_) => {
                tracing::info!(batch.ops = ops, "chunk committed");
                ChunkOutcome::Committed(ops)
            }
            Err(error) => {
                tracing::error!(batch.ops = ops, error = %error, "chunk commit failed");
                ChunkOutcome::Failed { ops, error }
            }
        })
    }
}
