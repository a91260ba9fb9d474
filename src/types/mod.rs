//! Public types exposed by the `orderbridge-core` crate.

pub mod document;
pub mod options;
pub mod plan;
pub mod stats;

pub use document::{
    CollectionPath, DocPath, Document, DocumentSnapshot, FieldValue, Payload,
    payload_from_document,
};
pub use options::{ApiRegion, SyncConfig};
pub use plan::{ChildWrite, LinkWrite, WritePlan};
pub use stats::{AssignmentStats, FlattenCheck, FlattenStats, RecordOutcome, RunStats};
