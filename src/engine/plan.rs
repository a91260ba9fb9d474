use serde_json::Value;

use crate::constants::{
    CUSTOMER_NAME_FIELD, CUSTOMERS_ORDERS, DEFAULT_MARKETPLACE_NEEDLE, EXTERNAL_ID_FIELD,
    LAST_REFRESHED_FIELD, LEGACY_EXTERNAL_ID_FIELD, LINE_ITEM_ID_FIELD, LINE_ITEMS_FIELD,
    LINKED_AT_FIELD, MARKETPLACE_FLAG_FIELD, ORDER_LINE_ITEMS, SALESPERSON_FIELD,
};
use crate::types::{
    ChildWrite, DocPath, Document, DocumentSnapshot, FieldValue, LinkWrite, Payload, WritePlan,
    payload_from_document,
};

const ORDER_NUMBER_FIELD: &str = "salesorder_number";
const ORDER_DATE_FIELD: &str = "date";
const ORDER_TOTAL_FIELD: &str = "total";

/// Length of generated line-item ids, in hex characters.
const GENERATED_ID_LEN: usize = 20;

/// Turns a fetched order into the writes for one parent record.
///
/// Pure: no store access, no clock. Timestamps are emitted as server-timestamp sentinels
/// and agent resolution happens before the builder is called.
#[derive(Debug, Clone)]
pub struct WritePlanBuilder {
    marketplace_needle: String,
}

impl Default for WritePlanBuilder {
    fn default() -> Self {
        Self {
            marketplace_needle: DEFAULT_MARKETPLACE_NEEDLE.to_string(),
        }
    }
}

impl WritePlanBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marketplace_needle(mut self, needle: impl Into<String>) -> Self {
        self.marketplace_needle = needle.into().to_lowercase();
        self
    }

    /// Case-insensitive substring match against the marketplace name.
    #[must_use]
    pub fn is_marketplace(&self, customer_name: &str) -> bool {
        customer_name
            .to_lowercase()
            .contains(&self.marketplace_needle)
    }

    /// Plan for the stored `local` record given its authoritative `fetched` version and,
    /// if one was resolved, the owning agent document.
    ///
    /// The overwrite keeps the local external-id fields so the next run can find the
    /// record upstream again.
    #[must_use]
    pub fn build(
        &self,
        local: &DocumentSnapshot,
        fetched: &Document,
        agent: Option<&DocPath>,
    ) -> WritePlan {
        let parent = &local.path;
        let mut record = fetched.clone();
        for field in [EXTERNAL_ID_FIELD, LEGACY_EXTERNAL_ID_FIELD] {
            if let Some(value) = local.get(field) {
                record
                    .entry(field.to_string())
                    .or_insert_with(|| value.clone());
            }
        }
        let customer_name = record
            .get(CUSTOMER_NAME_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        record.insert(
            MARKETPLACE_FLAG_FIELD.to_string(),
            Value::Bool(self.is_marketplace(&customer_name)),
        );
        let line_items = record.remove(LINE_ITEMS_FIELD);

        let children = match line_items {
            Some(Value::Array(items)) => child_writes(parent, items),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                tracing::warn!(
                    order.id = parent.id(),
                    line_items.kind = json_kind(&other),
                    "line_items is not an array; ignoring"
                );
                Vec::new()
            }
        };

        let link = match (agent, salesperson_reference(fetched)) {
            (Some(agent), Some(_)) => Some(link_write(parent, agent, fetched, &customer_name)),
            _ => None,
        };

        let mut parent_fields = payload_from_document(record);
        parent_fields.insert(LAST_REFRESHED_FIELD.to_string(), FieldValue::ServerTimestamp);

        WritePlan {
            parent: parent.clone(),
            parent_fields,
            children,
            link,
        }
    }
}

/// Salesperson reference on a fetched record, as sent: a non-empty string or a number.
#[must_use]
pub fn salesperson_reference(fetched: &Document) -> Option<&Value> {
    fetched
        .get(SALESPERSON_FIELD)
        .filter(|value| scalar_id(value).is_some())
}

fn child_writes(parent: &DocPath, items: Vec<Value>) -> Vec<ChildWrite> {
    let collection = parent.sub(ORDER_LINE_ITEMS);
    let mut children = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(item) = item else {
            tracing::warn!(
                order.id = parent.id(),
                line_item.index = index,
                "skipping non-object line item"
            );
            continue;
        };
        let id = item
            .get(LINE_ITEM_ID_FIELD)
            .and_then(scalar_id)
            .unwrap_or_else(|| generated_line_item_id(parent, index, &item));
        children.push(ChildWrite {
            path: collection.doc(id),
            fields: payload_from_document(item),
        });
    }
    children
}

fn link_write(
    parent: &DocPath,
    agent: &DocPath,
    fetched: &Document,
    customer_name: &str,
) -> LinkWrite {
    let copied =
        |field: &str| FieldValue::Value(fetched.get(field).cloned().unwrap_or(Value::Null));

    let mut fields = Payload::new();
    fields.insert(
        "sales_order_id".to_string(),
        FieldValue::Value(Value::String(parent.id().to_string())),
    );
    fields.insert("sales_order_number".to_string(), copied(ORDER_NUMBER_FIELD));
    fields.insert("order_date".to_string(), copied(ORDER_DATE_FIELD));
    fields.insert("total".to_string(), copied(ORDER_TOTAL_FIELD));
    fields.insert(
        CUSTOMER_NAME_FIELD.to_string(),
        FieldValue::Value(Value::String(customer_name.to_string())),
    );
    fields.insert(LINKED_AT_FIELD.to_string(), FieldValue::ServerTimestamp);

    LinkWrite {
        path: agent.sub(CUSTOMERS_ORDERS).doc(parent.id()),
        fields,
    }
}

fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Id for a line item the external system sent without one.
///
/// Derived from the parent, the item's position and its content so a re-run over the
/// same source writes the same child document instead of adding another.
fn generated_line_item_id(parent: &DocPath, index: usize, item: &Document) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(parent.to_string().as_bytes());
    hasher.update(&(index as u64).to_le_bytes());
    hasher.update(Value::Object(item.clone()).to_string().as_bytes());
    let mut id = hasher.finalize().to_hex().to_string();
    id.truncate(GENERATED_ID_LEN);
    id
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn order() -> DocumentSnapshot {
        DocumentSnapshot::new(
            DocPath::new("sales_orders", "SO-1"),
            document(json!({"_original_zoho_id": "9001", "stale": true})),
        )
    }

    #[test]
    fn marketplace_flag_is_case_insensitive_substring() {
        let builder = WritePlanBuilder::new();
        assert!(builder.is_marketplace("Amazon EU Sarl"));
        assert!(builder.is_marketplace("via AMAZON.co.uk"));
        assert!(!builder.is_marketplace("Acme Ltd"));
        assert!(!builder.is_marketplace(""));

        let amazon = document(json!({"customer_name": "Amazon EU Sarl"}));
        let plan = builder.build(&order(), &amazon, None);
        assert_eq!(
            plan.parent_fields.get(MARKETPLACE_FLAG_FIELD),
            Some(&FieldValue::Value(json!(true)))
        );
    }

    #[test]
    fn line_items_move_to_children() {
        let fetched = document(json!({
            "customer_name": "Acme Ltd",
            "line_items": [
                {"line_item_id": "a", "sku": "X"},
                {"line_item_id": 42, "sku": "Y"},
                {"sku": "Z"},
                "garbage"
            ]
        }));
        let plan = WritePlanBuilder::new().build(&order(), &fetched, None);

        assert!(!plan.parent_fields.contains_key(LINE_ITEMS_FIELD));
        assert!(!plan.parent_fields.contains_key("stale"));
        assert_eq!(
            plan.parent_fields.get(EXTERNAL_ID_FIELD),
            Some(&FieldValue::Value(json!("9001")))
        );
        assert_eq!(
            plan.parent_fields.get(LAST_REFRESHED_FIELD),
            Some(&FieldValue::ServerTimestamp)
        );
        let ids: Vec<&str> = plan.children.iter().map(|c| c.path.id()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(&ids[..2], &["a", "42"]);
        assert_eq!(ids[2].len(), GENERATED_ID_LEN);
        assert_eq!(
            plan.children[0].path.to_string(),
            "sales_orders/SO-1/order_line_items/a"
        );
        assert_eq!(plan.op_count(), 4);
    }

    #[test]
    fn generated_ids_are_stable_across_builds() {
        let fetched = document(json!({"line_items": [{"sku": "Z"}, {"sku": "Z"}]}));
        let builder = WritePlanBuilder::new();
        let first = builder.build(&order(), &fetched, None);
        let second = builder.build(&order(), &fetched, None);

        assert_eq!(first.children, second.children);
        assert_ne!(first.children[0].path, first.children[1].path);
    }

    #[test]
    fn non_array_line_items_yield_no_children() {
        let fetched = document(json!({"line_items": {"line_item_id": "a"}}));
        let plan = WritePlanBuilder::new().build(&order(), &fetched, None);
        assert!(plan.children.is_empty());
        assert!(!plan.parent_fields.contains_key(LINE_ITEMS_FIELD));
    }

    #[test]
    fn link_requires_reference_and_agent() {
        let agent = DocPath::new("sales_agents", "A1");
        let with_ref = document(json!({
            "salesperson_id": "sp-9",
            "salesorder_number": "SO-00042",
            "date": "2025-03-01",
            "total": 120.5,
            "customer_name": "Acme Ltd"
        }));
        let builder = WritePlanBuilder::new();

        let plan = builder.build(&order(), &with_ref, Some(&agent));
        let link = plan.link.expect("link");
        assert_eq!(link.path.to_string(), "sales_agents/A1/customers_orders/SO-1");
        assert_eq!(link.fields.get("sales_order_id"), Some(&FieldValue::Value(json!("SO-1"))));
        assert_eq!(
            link.fields.get("sales_order_number"),
            Some(&FieldValue::Value(json!("SO-00042")))
        );
        assert_eq!(link.fields.get("order_date"), Some(&FieldValue::Value(json!("2025-03-01"))));
        assert_eq!(link.fields.get("total"), Some(&FieldValue::Value(json!(120.5))));
        assert_eq!(link.fields.get(LINKED_AT_FIELD), Some(&FieldValue::ServerTimestamp));

        assert!(builder.build(&order(), &with_ref, None).link.is_none());
        let without_ref = document(json!({"customer_name": "Acme Ltd"}));
        assert!(builder.build(&order(), &without_ref, Some(&agent)).link.is_none());
    }

    #[test]
    fn salesperson_reference_keeps_numbers_as_sent() {
        assert_eq!(
            salesperson_reference(&document(json!({"salesperson_id": 771}))),
            Some(&json!(771))
        );
        assert_eq!(salesperson_reference(&document(json!({"salesperson_id": ""}))), None);
        assert_eq!(salesperson_reference(&document(json!({}))), None);
    }
}
