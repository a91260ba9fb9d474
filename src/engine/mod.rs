//! Migration passes over the document store.
//!
//! The restructuring pass refreshes each sales order from the external API and splits
//! it into parent, line-item children and an agent link, one atomic batch per order.
//! The customer passes rebuild agent assignments and flatten the legacy `sales` map.

mod agents;
mod apply;
mod assign;
mod flatten;
mod orchestrator;
mod plan;

pub use agents::AgentResolver;
pub use apply::{AtomicBatchApplier, ChunkOutcome, ChunkedWriter};
pub use assign::{CustomerAssignment, assigned_customer_summary};
pub use flatten::NestedMapFlattener;
pub use orchestrator::RestructuringOrchestrator;
pub use plan::{WritePlanBuilder, salesperson_reference};
