use serde_json::Value;

use crate::constants::{AGENT_EXTERNAL_ID_FIELD, SALES_AGENTS};
use crate::error::StoreResult;
use crate::store::DocumentStore;
use crate::types::{CollectionPath, DocumentSnapshot};

/// Finds the agent document a salesperson reference points at.
///
/// Two strategies exist and the order between them is fixed:
/// 1. the reference is an agent document id;
/// 2. the reference equals an agent's external-id field (first match by document id).
///
/// External ids are compared as stored; a numeric reference that matches nothing is
/// retried in its decimal string form.
#[derive(Debug)]
pub struct AgentResolver<S> {
    store: S,
    agents: CollectionPath,
}

impl<S: DocumentStore> AgentResolver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            agents: CollectionPath::root(SALES_AGENTS),
        }
    }

    /// Strategy 2 only.
    pub fn resolve_by_external_id(
        &self,
        reference: &Value,
    ) -> StoreResult<Option<DocumentSnapshot>> {
        match reference {
            Value::String(id) if !id.is_empty() => {
                self.store
                    .find_first(&self.agents, AGENT_EXTERNAL_ID_FIELD, reference)
            }
            Value::Number(id) => {
                let exact = self
                    .store
                    .find_first(&self.agents, AGENT_EXTERNAL_ID_FIELD, reference)?;
                if exact.is_some() {
                    return Ok(exact);
                }
                self.store.find_first(
                    &self.agents,
                    AGENT_EXTERNAL_ID_FIELD,
                    &Value::String(id.to_string()),
                )
            }
            _ => Ok(None),
        }
    }

    /// Strategy 1, then strategy 2.
    pub fn resolve(&self, reference: &str) -> StoreResult<Option<DocumentSnapshot>> {
        if reference.is_empty() {
            return Ok(None);
        }
        if let Some(agent) = self.store.get(&self.agents.doc(reference))? {
            tracing::debug!(
                agent.reference = reference,
                agent.id = agent.id(),
                "agent resolved by document id"
            );
            return Ok(Some(agent));
        }
        let agent = self.resolve_by_external_id(&Value::String(reference.to_string()))?;
        if let Some(agent) = &agent {
            tracing::debug!(
                agent.reference = reference,
                agent.id = agent.id(),
                "agent resolved by external id"
            );
        }
        Ok(agent)
    }
}
