//! Restructuring against the file-backed store, including crash recovery.

use std::fs::OpenOptions;
use std::io::Write;

use serde_json::{Value, json};
use tempfile::TempDir;

use orderbridge_core::{
    DocPath, DocumentStore, FetchOutcome, FieldValue, JournaledStore, Payload, RecordSource,
    RestructuringOrchestrator, WriteBatch,
};

/// Serves one fixed order for every id.
struct StaticSource(Value);

impl RecordSource for StaticSource {
    fn fetch(&mut self, _record_id: &str) -> orderbridge_core::Result<FetchOutcome> {
        match &self.0 {
            Value::Object(map) => Ok(FetchOutcome::Found(map.clone())),
            _ => Ok(FetchOutcome::NotFound),
        }
    }
}

fn value_fields(value: Value) -> Payload {
    match value {
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| (key, FieldValue::Value(value)))
            .collect(),
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn restructured_state_survives_reopen_and_torn_tail() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("orders.journal");
    let order = DocPath::new("sales_orders", "SO-1");

    {
        let store = JournaledStore::open(&path).unwrap();
        let mut seed = WriteBatch::new();
        seed.set(order.clone(), value_fields(json!({"_original_zoho_id": "9001"})))
            .set(
                DocPath::new("sales_agents", "A1"),
                value_fields(json!({"zohospID": "sp-1"})),
            );
        store.commit(seed).unwrap();

        let source = StaticSource(json!({
            "customer_name": "Acme Ltd",
            "salesperson_id": "sp-1",
            "total": 12,
            "line_items": [{"line_item_id": "a"}, {"line_item_id": "b"}]
        }));
        let stats = RestructuringOrchestrator::new(&store, source).run().unwrap();
        assert_eq!((stats.updated, stats.linked), (1, 1));
        assert_eq!(store.journal_stats().unwrap().records, 2);
    }

    // Simulate a crash halfway through appending the next batch.
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[7u8; 30]).unwrap();
    }

    let reopened = JournaledStore::open(&path).unwrap();
    let parent = reopened.get(&order).unwrap().unwrap();
    assert_eq!(parent.get("total"), Some(&json!(12)));
    assert_eq!(parent.get("is_marketplace_order"), Some(&json!(false)));
    assert_eq!(reopened.list(&order.sub("order_line_items")).unwrap().len(), 2);
    assert!(reopened
        .get(&DocPath::new("sales_agents", "A1").sub("customers_orders").doc("SO-1"))
        .unwrap()
        .is_some());
    assert_eq!(reopened.journal_stats().unwrap().records, 2);
}
