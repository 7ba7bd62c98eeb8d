use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Insertable, Serialize)]
#[diesel(table_name = crate::schema::admin_users)]
pub struct AdminUser {
    pub id: String,
    pub username: String,
    pub full_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::categories)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub name_lc: String,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = crate::schema::categories)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub name_lc: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::products)]
pub struct Product {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub name_lc: String,
    pub price_usd: i64,
    pub price_khr: i64,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::products)]
pub struct ProductChanges {
    pub category_id: Option<String>,
    pub name: Option<String>,
    pub name_lc: Option<String>,
    pub price_usd: Option<i64>,
    pub price_khr: Option<i64>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::dining_tables)]
pub struct DiningTable {
    pub id: String,
    pub code: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = crate::schema::dining_tables)]
pub struct TableChanges {
    pub code: Option<String>,
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::customers)]
pub struct Customer {
    pub id: String,
    pub external_id: String,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub last_table_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::orders)]
pub struct Order {
    pub id: String,
    pub order_no: String,
    pub table_id: String,
    pub customer_id: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub subtotal_usd: i64,
    pub subtotal_khr: i64,
    pub total_usd: i64,
    pub total_khr: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Administrative override. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = crate::schema::orders)]
pub struct OrderChanges {
    pub status: Option<OrderStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub subtotal_usd: Option<i64>,
    pub subtotal_khr: Option<i64>,
    pub total_usd: Option<i64>,
    pub total_khr: Option<i64>,
    pub note: Option<String>,
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// `line_no` is left to its sequence on insert and only used for ordering,
/// so the struct selects every column except it.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::order_items)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub product_name_lc: String,
    pub unit_price_usd: i64,
    pub unit_price_khr: i64,
    pub qty: i32,
    pub line_total_usd: i64,
    pub line_total_khr: i64,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct DbOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<OutboxEvent> for DbOutboxEvent {
    fn from(event: OutboxEvent) -> Self {
        Self {
            id: event.id,
            aggregate_id: event.aggregate_id,
            event_type: event.event_type,
            event_data: event.event_data,
            processed: event.processed,
            created_at: event.created_at,
        }
    }
}
