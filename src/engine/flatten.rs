use super::apply::{ChunkOutcome, ChunkedWriter};
use crate::constants::{CUSTOMERS, FLATTENED_SALES_FIELDS, MAX_BATCH_OPS, SALES_MAP_FIELD};
use crate::error::{OrderBridgeError, Result};
use crate::store::{DocumentStore, WriteOp};
use crate::types::{CollectionPath, FieldValue, FlattenCheck, FlattenStats, Payload};

/// Moves the nested `sales` map on each customer to root-level fields.
///
/// A second run finds no `sales` maps left and skips every document.
#[derive(Debug)]
pub struct NestedMapFlattener<S> {
    store: S,
    batch_size: usize,
}

impl<S: DocumentStore> NestedMapFlattener<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            batch_size: MAX_BATCH_OPS,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// With `dry_run` nothing is written but the counts are the same.
    ///
    /// A failed chunk commit stops the migration and is returned as the error; chunks
    /// committed before it stay applied.
    pub fn run(&self, dry_run: bool) -> Result<FlattenStats> {
        let customers = self.store.list(&CollectionPath::root(CUSTOMERS))?;
        let mut stats = FlattenStats {
            total: customers.len(),
            dry_run,
            fields_extracted: FLATTENED_SALES_FIELDS
                .iter()
                .map(|field| ((*field).to_string(), 0))
                .collect(),
            ..FlattenStats::default()
        };
        let mut writer = ChunkedWriter::new(&self.store, self.batch_size);

        for customer in customers {
            let Some(sales) = customer.get(SALES_MAP_FIELD) else {
                tracing::debug!(customer.id = customer.id(), "no sales map; skipping");
                stats.skipped += 1;
                continue;
            };

            let mut fields = Payload::new();
            if let Some(sales) = sales.as_object() {
                for field in FLATTENED_SALES_FIELDS {
                    if let Some(value) = sales.get(field) {
                        fields.insert(field.to_string(), FieldValue::Value(value.clone()));
                        *stats.fields_extracted.entry(field.to_string()).or_default() += 1;
                    }
                }
            }
            tracing::info!(
                customer.id = customer.id(),
                flatten.fields = fields.len(),
                "extracting sales fields"
            );
            fields.insert(SALES_MAP_FIELD.to_string(), FieldValue::Delete);
            stats.migrated += 1;

            if dry_run {
                continue;
            }
            let op = WriteOp::Update {
                path: customer.path,
                fields,
            };
            if let Some(outcome) = writer.push(op) {
                check(&mut stats, outcome)?;
            }
        }
        if let Some(outcome) = writer.flush() {
            check(&mut stats, outcome)?;
        }

        tracing::info!(
            flatten.dry_run = dry_run,
            flatten.total = stats.total,
            flatten.migrated = stats.migrated,
            flatten.skipped = stats.skipped,
            flatten.errors = stats.errors,
            "sales map flattening complete"
        );
        Ok(stats)
    }

    /// Reports, for up to `sample_size` customers, what the migration left behind.
    pub fn verify(&self, sample_size: usize) -> Result<Vec<FlattenCheck>> {
        let customers = self.store.list(&CollectionPath::root(CUSTOMERS))?;
        let checks: Vec<FlattenCheck> = customers
            .into_iter()
            .take(sample_size)
            .map(|customer| FlattenCheck {
                has_sales_map: customer.data.contains_key(SALES_MAP_FIELD),
                root_fields: FLATTENED_SALES_FIELDS
                    .iter()
                    .filter(|field| customer.data.contains_key(**field))
                    .map(|field| (*field).to_string())
                    .collect(),
                id: customer.id().to_string(),
            })
            .collect();

        for check in &checks {
            if check.has_sales_map {
                tracing::warn!(customer.id = %check.id, "sales map still present");
            }
        }
        Ok(checks)
    }
}

fn check(stats: &mut FlattenStats, outcome: ChunkOutcome) -> Result<()> {
    match outcome {
        ChunkOutcome::Committed(_) => Ok(()),
        ChunkOutcome::Failed { ops, error } => {
            stats.errors += ops;
            tracing::error!(
                flatten.migrated = stats.migrated,
                flatten.errors = stats.errors,
                "flattening aborted"
            );
            Err(OrderBridgeError::Store(error))
        }
    }
}
