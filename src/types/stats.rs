//! Run statistics reported by the migration passes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal state of one parent record within a restructuring run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Applied { linked: bool, line_items: usize },
    /// No canonical or legacy external id on the record.
    Skipped,
    FetchFailed,
    /// The agent lookup itself failed against the store.
    LookupFailed,
    ApplyFailed,
}

impl RecordOutcome {
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::FetchFailed | Self::LookupFailed | Self::ApplyFailed
        )
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Skipped => "skipped",
            Self::FetchFailed => "fetch_failed",
            Self::LookupFailed => "lookup_failed",
            Self::ApplyFailed => "apply_failed",
        }
    }
}

/// Aggregate counts for one restructuring run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub total: usize,
    pub skipped: usize,
    pub updated: usize,
    pub errors: usize,
    pub linked: usize,
    pub line_items_written: usize,
}

impl RunStats {
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            total: 0,
            skipped: 0,
            updated: 0,
            errors: 0,
            linked: 0,
            line_items_written: 0,
        }
    }

    pub fn record(&mut self, outcome: RecordOutcome) {
        self.total += 1;
        match outcome {
            RecordOutcome::Applied { linked, line_items } => {
                self.updated += 1;
                self.linked += usize::from(linked);
                self.line_items_written += line_items;
            }
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::FetchFailed
            | RecordOutcome::LookupFailed
            | RecordOutcome::ApplyFailed => self.errors += 1,
        }
    }
}

/// Counts for rebuilding agents' assigned-customer collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentStats {
    pub processed: usize,
    pub assigned: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Stale assignments removed before the rebuild.
    pub cleared: usize,
}

/// Counts for moving nested `sales` map fields onto the customer root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenStats {
    pub total: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub dry_run: bool,
    pub fields_extracted: BTreeMap<String, usize>,
}

/// Post-migration check of one customer document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenCheck {
    pub id: String,
    pub has_sales_map: bool,
    pub root_fields: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_fold_into_counts() {
        let mut stats = RunStats::new(Uuid::nil());
        stats.record(RecordOutcome::Applied {
            linked: true,
            line_items: 3,
        });
        stats.record(RecordOutcome::Applied {
            linked: false,
            line_items: 0,
        });
        stats.record(RecordOutcome::Skipped);
        stats.record(RecordOutcome::FetchFailed);
        stats.record(RecordOutcome::ApplyFailed);
        stats.record(RecordOutcome::LookupFailed);

        assert_eq!(stats.total, 6);
        assert_eq!(stats.updated, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 3);
        assert_eq!(stats.linked, 1);
        assert_eq!(stats.line_items_written, 3);
    }
}
