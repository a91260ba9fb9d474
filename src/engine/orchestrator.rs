use uuid::Uuid;

use super::agents::AgentResolver;
use super::apply::AtomicBatchApplier;
use super::plan::{WritePlanBuilder, salesperson_reference};
use crate::api::{FetchOutcome, RecordSource};
use crate::constants::{EXTERNAL_ID_FIELD, LEGACY_EXTERNAL_ID_FIELD, SALES_ORDERS};
use crate::error::Result;
use crate::store::DocumentStore;
use crate::types::{CollectionPath, DocumentSnapshot, RecordOutcome, RunStats};

/// Refreshes every parent record from the external system and restructures it.
///
/// The parent collection is snapshotted once at the start of [`run`](Self::run) and
/// processed sequentially in stored-id order. Each record is one atomic unit: fetch,
/// resolve the agent, build a plan, commit. A failure on one record is counted and the
/// run moves on; only an authentication failure aborts it.
#[derive(Debug)]
pub struct RestructuringOrchestrator<S, R> {
    store: S,
    source: R,
    builder: WritePlanBuilder,
}

impl<S: DocumentStore, R: RecordSource> RestructuringOrchestrator<S, R> {
    pub fn new(store: S, source: R) -> Self {
        Self {
            store,
            source,
            builder: WritePlanBuilder::new(),
        }
    }

    pub fn with_builder(mut self, builder: WritePlanBuilder) -> Self {
        self.builder = builder;
        self
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn source(&self) -> &R {
        &self.source
    }

    pub fn into_parts(self) -> (S, R) {
        (self.store, self.source)
    }

    pub fn run(&mut self) -> Result<RunStats> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("restructure", run.id = %run_id);
        let _guard = span.enter();

        let records = self.store.list(&CollectionPath::root(SALES_ORDERS))?;
        tracing::info!(run.total = records.len(), "parent snapshot taken");

        let mut stats = RunStats::new(run_id);
        for (index, record) in records.iter().enumerate() {
            let outcome = match self.process_record(record) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(
                        order.id = record.id(),
                        run.processed = index,
                        error = %err,
                        "aborting run"
                    );
                    return Err(err);
                }
            };
            tracing::info!(
                order.id = record.id(),
                run.position = index + 1,
                run.total = records.len(),
                outcome = outcome.label(),
                "record processed"
            );
            stats.record(outcome);
        }

        tracing::info!(
            run.total = stats.total,
            run.updated = stats.updated,
            run.skipped = stats.skipped,
            run.errors = stats.errors,
            run.linked = stats.linked,
            run.line_items = stats.line_items_written,
            "restructuring run complete"
        );
        Ok(stats)
    }

    /// One record end to end. `Err` only for failures that must abort the whole run.
    pub fn process_record(&mut self, record: &DocumentSnapshot) -> Result<RecordOutcome> {
        let Some(external_id) = external_id(record) else {
            tracing::warn!(order.id = record.id(), "no external id; skipping");
            return Ok(RecordOutcome::Skipped);
        };

        let fetched = match self.source.fetch(external_id) {
            Ok(FetchOutcome::Found(fetched)) => fetched,
            Ok(FetchOutcome::NotFound) => {
                tracing::warn!(
                    order.id = record.id(),
                    order.external_id = external_id,
                    "record not available upstream"
                );
                return Ok(RecordOutcome::FetchFailed);
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    order.id = record.id(),
                    order.external_id = external_id,
                    error = %err,
                    "fetch failed"
                );
                return Ok(RecordOutcome::FetchFailed);
            }
        };

        let agent = match salesperson_reference(&fetched) {
            Some(reference) => {
                match AgentResolver::new(&self.store).resolve_by_external_id(reference) {
                    Ok(Some(agent)) => Some(agent.path),
                    Ok(None) => {
                        tracing::warn!(
                            order.id = record.id(),
                            agent.reference = %reference,
                            "no agent for salesperson"
                        );
                        None
                    }
                    Err(err) => {
                        tracing::error!(
                            order.id = record.id(),
                            agent.reference = %reference,
                            error = %err,
                            "agent lookup failed"
                        );
                        return Ok(RecordOutcome::LookupFailed);
                    }
                }
            }
            None => None,
        };

        let plan = self.builder.build(record, &fetched, agent.as_ref());
        let linked = plan.link.is_some();
        let line_items = plan.children.len();

        match AtomicBatchApplier::new(&self.store).apply(plan) {
            Ok(()) => Ok(RecordOutcome::Applied { linked, line_items }),
            Err(_) => Ok(RecordOutcome::ApplyFailed),
        }
    }
}

/// Canonical external id, else the legacy one. Empty strings count as missing.
fn external_id(record: &DocumentSnapshot) -> Option<&str> {
    record
        .get_str(EXTERNAL_ID_FIELD)
        .or_else(|| record.get_str(LEGACY_EXTERNAL_ID_FIELD))
}
