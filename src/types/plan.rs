//! In-memory write plan for one parent record's sync pass.

use super::document::{DocPath, Payload};

/// One materialized line item under the parent's child collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildWrite {
    pub path: DocPath,
    pub fields: Payload,
}

/// Denormalized order summary merged under the owning agent.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkWrite {
    pub path: DocPath,
    pub fields: Payload,
}

/// Computed, not-yet-applied mutations for a single parent record.
///
/// Empty parts are legal: a plan with no children and no link still overwrites the parent.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub parent: DocPath,
    pub parent_fields: Payload,
    pub children: Vec<ChildWrite>,
    pub link: Option<LinkWrite>,
}

impl WritePlan {
    /// Number of store operations the plan expands to.
    #[must_use]
    pub fn op_count(&self) -> usize {
        1 + self.children.len() + usize::from(self.link.is_some())
    }
}
