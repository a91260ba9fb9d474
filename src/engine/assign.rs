use serde_json::Value;

use super::agents::AgentResolver;
use super::apply::{ChunkOutcome, ChunkedWriter};
use crate::constants::{
    AGENT_NAME_FIELD, ASSIGNED_AT_FIELD, ASSIGNED_CUSTOMERS, CUSTOMER_AGENT_FIELD, CUSTOMERS,
    MAX_BATCH_OPS, SALES_AGENTS,
};
use crate::error::Result;
use crate::store::{DocumentStore, WriteOp};
use crate::types::{AssignmentStats, CollectionPath, DocumentSnapshot, FieldValue, Payload};

/// String fields copied onto an assignment summary, defaulting to `""`.
const SUMMARY_STRING_FIELDS: [&str; 6] = [
    "customer_name",
    "company_name",
    "email",
    "phone",
    "customer_type",
    "payment_terms",
];

/// Rebuilds every agent's `assigned_customers` sub-collection from `customers`.
#[derive(Debug)]
pub struct CustomerAssignment<S> {
    store: S,
    batch_size: usize,
}

impl<S: DocumentStore> CustomerAssignment<S> {
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

    pub fn run(&self) -> Result<AssignmentStats> {
        let mut stats = AssignmentStats {
            cleared: self.clear_assignments()?,
            ..AssignmentStats::default()
        };

        let customers = self.store.list(&CollectionPath::root(CUSTOMERS))?;
        tracing::info!(customers.total = customers.len(), "assigning customers to agents");

        let resolver = AgentResolver::new(&self.store);
        let mut writer = ChunkedWriter::new(&self.store, self.batch_size);

        for customer in &customers {
            stats.processed += 1;
            let Some(agent_ref) = customer.get_str(CUSTOMER_AGENT_FIELD) else {
                tracing::warn!(customer.id = customer.id(), "no sales agent id; skipping");
                stats.skipped += 1;
                continue;
            };

            let agent = match resolver.resolve(agent_ref) {
                Ok(Some(agent)) => agent,
                Ok(None) => {
                    tracing::warn!(
                        customer.id = customer.id(),
                        agent.reference = agent_ref,
                        "sales agent not found"
                    );
                    stats.errors += 1;
                    continue;
                }
                Err(err) => {
                    tracing::error!(
                        customer.id = customer.id(),
                        agent.reference = agent_ref,
                        error = %err,
                        "agent lookup failed"
                    );
                    stats.errors += 1;
                    continue;
                }
            };

            let op = WriteOp::Set {
                path: agent.path.sub(ASSIGNED_CUSTOMERS).doc(customer.id()),
                fields: assigned_customer_summary(customer),
            };
            stats.assigned += 1;
            tracing::debug!(
                customer.id = customer.id(),
                agent.id = agent.id(),
                agent.name = agent.get_str(AGENT_NAME_FIELD).unwrap_or_default(),
                "assignment queued"
            );
            if let Some(outcome) = writer.push(op) {
                settle(&mut stats, outcome);
            }
        }
        if let Some(outcome) = writer.flush() {
            settle(&mut stats, outcome);
        }

        tracing::info!(
            assign.processed = stats.processed,
            assign.assigned = stats.assigned,
            assign.skipped = stats.skipped,
            assign.errors = stats.errors,
            assign.cleared = stats.cleared,
            "customer assignment complete"
        );
        Ok(stats)
    }

    /// Deletes every existing assignment under every agent; returns how many.
    fn clear_assignments(&self) -> Result<usize> {
        let agents = self.store.list(&CollectionPath::root(SALES_AGENTS))?;
        let mut writer = ChunkedWriter::new(&self.store, self.batch_size);
        let mut cleared = 0;

        for agent in &agents {
            for assignment in self.store.list(&agent.path.sub(ASSIGNED_CUSTOMERS))? {
                if let Some(outcome) = writer.push(WriteOp::Delete {
                    path: assignment.path,
                }) {
                    cleared += committed(outcome)?;
                }
            }
        }
        if let Some(outcome) = writer.flush() {
            cleared += committed(outcome)?;
        }

        tracing::info!(
            agents.total = agents.len(),
            assign.cleared = cleared,
            "stale assignments cleared"
        );
        Ok(cleared)
    }
}

fn committed(outcome: ChunkOutcome) -> Result<usize> {
    match outcome {
        ChunkOutcome::Committed(ops) => Ok(ops),
        ChunkOutcome::Failed { error, .. } => Err(error.into()),
    }
}

fn settle(stats: &mut AssignmentStats, outcome: ChunkOutcome) {
    if let ChunkOutcome::Failed { ops, .. } = outcome {
        stats.assigned -= ops;
        stats.errors += ops;
    }
}

/// Denormalized customer card stored under the owning agent.
#[must_use]
pub fn assigned_customer_summary(customer: &DocumentSnapshot) -> Payload {
    let mut fields = Payload::new();
    let mut put = |key: &str, value: Value| {
        fields.insert(key.to_string(), FieldValue::Value(value));
    };

    put("customer_id", Value::String(customer.id().to_string()));
    for field in SUMMARY_STRING_FIELDS {
        put(field, customer.get(field).cloned().unwrap_or_else(empty));
    }
    put("city", address_field(customer, "city"));
    put("postcode", address_field(customer, "postcode"));
    put(
        "credit_limit",
        customer.get("credit_limit").cloned().unwrap_or(Value::from(0)),
    );

    fields.insert(ASSIGNED_AT_FIELD.to_string(), FieldValue::ServerTimestamp);
    fields
}

/// Root-level value if set, else the one inside `billing_address`, else `""`.
fn address_field(customer: &DocumentSnapshot, field: &str) -> Value {
    customer
        .get(field)
        .filter(|value| is_set(value))
        .or_else(|| customer.get("billing_address")?.get(field))
        .cloned()
        .unwrap_or_else(empty)
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn empty() -> Value {
    Value::String(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocPath;
    use serde_json::json;

    fn customer(data: Value) -> DocumentSnapshot {
        let Value::Object(data) = data else {
            panic!("object expected");
        };
        DocumentSnapshot::new(DocPath::new(CUSTOMERS, "C1"), data)
    }

    fn value(fields: &Payload, key: &str) -> Value {
        match fields.get(key) {
            Some(FieldValue::Value(value)) => value.clone(),
            other => panic!("{key}: unexpected {other:?}"),
        }
    }

    #[test]
    fn summary_defaults_missing_fields() {
        let fields = assigned_customer_summary(&customer(json!({"customer_name": "Acme"})));

        assert_eq!(value(&fields, "customer_id"), json!("C1"));
        assert_eq!(value(&fields, "customer_name"), json!("Acme"));
        assert_eq!(value(&fields, "email"), json!(""));
        assert_eq!(value(&fields, "city"), json!(""));
        assert_eq!(value(&fields, "credit_limit"), json!(0));
        assert_eq!(fields.get(ASSIGNED_AT_FIELD), Some(&FieldValue::ServerTimestamp));
        assert_eq!(fields.len(), 11);
    }

    #[test]
    fn address_falls_back_to_billing_address() {
        let fields = assigned_customer_summary(&customer(json!({
            "city": "",
            "postcode": "NW1 6XE",
            "billing_address": {"city": "London", "postcode": "EC1A 1BB"}
        })));

        assert_eq!(value(&fields, "city"), json!("London"));
        assert_eq!(value(&fields, "postcode"), json!("NW1 6XE"));
    }
}
