#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::float_cmp
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: internal helpers are self-describing; public entry points carry docs.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Journal headers are fixed-width little-endian; lengths are bounded by the header layout.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_lossless)]
//
// Migration passes read top to bottom; splitting them hurts more than it helps.
#![allow(clippy::too_many_lines)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_continue)]

/// The orderbridge-core crate version (matches `Cargo.toml`).
pub const ORDERBRIDGE_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
pub mod constants;
pub mod engine;
pub mod error;
pub mod io;
mod lock;
pub mod store;
pub mod types;

pub use api::{
    AccessToken, ExternalRecordClient, FetchOutcome, HttpResponse, HttpTransport, RecordSource,
    ReqwestTransport, Sleeper, ThreadSleeper, TokenCache, TransportError,
};
pub use engine::{
    AgentResolver, AtomicBatchApplier, ChunkOutcome, ChunkedWriter, CustomerAssignment,
    NestedMapFlattener, RestructuringOrchestrator, WritePlanBuilder,
};
pub use error::{ApplyError, OrderBridgeError, Result, StoreError, StoreResult};
pub use io::journal::{Journal, JournalRecord, JournalStats};
pub use lock::FileLock;
pub use store::{
    CommitReceipt, DocumentStore, InMemoryStore, JournaledStore, ServerClock, WriteBatch, WriteOp,
};
pub use types::{
    ApiRegion, AssignmentStats, ChildWrite, CollectionPath, DocPath, Document, DocumentSnapshot,
    FieldValue, FlattenCheck, FlattenStats, LinkWrite, Payload, RecordOutcome, RunStats,
    SyncConfig, WritePlan,
};
