//! Collection names, field names and tuning defaults.

use std::time::Duration;

pub const SALES_ORDERS: &str = "sales_orders";
pub const ORDER_LINE_ITEMS: &str = "order_line_items";
pub const SALES_AGENTS: &str = "sales_agents";
pub const CUSTOMERS_ORDERS: &str = "customers_orders";
pub const CUSTOMERS: &str = "customers";
pub const ASSIGNED_CUSTOMERS: &str = "assigned_customers";

/// Canonical external id on a parent record.
pub const EXTERNAL_ID_FIELD: &str = "_original_zoho_id";
/// Legacy external id, consulted when the canonical field is absent.
pub const LEGACY_EXTERNAL_ID_FIELD: &str = "_original_firebase_id";
/// Secondary lookup key on agent documents.
pub const AGENT_EXTERNAL_ID_FIELD: &str = "zohospID";
pub const AGENT_NAME_FIELD: &str = "name";
pub const CUSTOMER_AGENT_FIELD: &str = "sales_agent_id";

pub const LINE_ITEMS_FIELD: &str = "line_items";
pub const LINE_ITEM_ID_FIELD: &str = "line_item_id";
pub const SALESPERSON_FIELD: &str = "salesperson_id";
pub const CUSTOMER_NAME_FIELD: &str = "customer_name";
pub const MARKETPLACE_FLAG_FIELD: &str = "is_marketplace_order";
pub const LAST_REFRESHED_FIELD: &str = "_last_refreshed_from_zoho";
pub const LINKED_AT_FIELD: &str = "_linked_at";
pub const ASSIGNED_AT_FIELD: &str = "_assigned_at";

/// Nested map moved to root-level fields on customers.
pub const SALES_MAP_FIELD: &str = "sales";
pub const FLATTENED_SALES_FIELDS: [&str; 5] = [
    "assigned_agent_id",
    "assigned_agent_name",
    "sales_channel",
    "salesperson_names",
    "salesperson_zoho_id",
];

pub const DEFAULT_MARKETPLACE_NEEDLE: &str = "amazon";

/// Upper bound on operations in one atomic batch.
pub const MAX_BATCH_OPS: usize = 500;

pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_millis(1_200);
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Kept under the provider's 60 minute token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(55 * 60);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// `code` value the order API uses for success.
pub const API_SUCCESS_CODE: i64 = 0;
