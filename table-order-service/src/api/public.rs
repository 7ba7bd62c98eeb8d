//! Customer-facing endpoints. No authentication; the table code is the only
//! credential a customer has.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Money, OrderStatus, PaymentMethod, PaymentStatus};

use super::extract::{ApiJson, ApiQuery};
use super::AppState;
use crate::error::AppError;
use crate::models::{Category, Product};
use crate::orders::{OrderDetail, PlaceOrder};
use crate::tables::TableView;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/public/categories", get(list_categories))
        .route("/public/products", get(list_products))
        .route("/public/tables/:code", get(table_by_code))
        .route("/public/orders", post(create_order))
        .route("/public/orders/:id", get(track_order))
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublicTable {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct PublicPayment {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
}

#[derive(Debug, Serialize)]
pub struct PublicOrderHeader {
    pub id: String,
    pub order_no: String,
    pub status: OrderStatus,
    pub table: PublicTable,
    pub note: Option<String>,
    pub payment: PublicPayment,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PublicProduct {
    pub id: String,
    pub name: String,
    pub name_lc: String,
}

#[derive(Debug, Serialize)]
pub struct PublicOrderLine {
    pub product: PublicProduct,
    pub qty: i32,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Serialize)]
pub struct PublicOrderSummary {
    pub item_count: usize,
    pub subtotal: Money,
    pub total: Money,
}

/// Tracking view of an order: header, lines and both-currency summary.
#[derive(Debug, Serialize)]
pub struct PublicOrderView {
    pub order: PublicOrderHeader,
    pub items: Vec<PublicOrderLine>,
    pub summary: PublicOrderSummary,
}

impl From<OrderDetail> for PublicOrderView {
    fn from(detail: OrderDetail) -> Self {
        let OrderDetail { order, table, items } = detail;
        Self {
            summary: PublicOrderSummary {
                item_count: items.len(),
                subtotal: Money::new(order.subtotal_usd, order.subtotal_khr),
                total: Money::new(order.total_usd, order.total_khr),
            },
            items: items
                .into_iter()
                .map(|item| PublicOrderLine {
                    unit_price: Money::new(item.unit_price_usd, item.unit_price_khr),
                    line_total: Money::new(item.line_total_usd, item.line_total_khr),
                    qty: item.qty,
                    product: PublicProduct {
                        id: item.product_id,
                        name: item.product_name,
                        name_lc: item.product_name_lc,
                    },
                })
                .collect(),
            order: PublicOrderHeader {
                id: order.id,
                order_no: order.order_no,
                status: order.status,
                table: PublicTable { code: table.code, name: table.name },
                note: order.note,
                payment: PublicPayment { method: order.payment_method, status: order.payment_status },
                created_at: order.created_at,
            },
        }
    }
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(state.catalog.active_categories().await?))
}

async fn list_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.catalog.active_products(query.category_id.as_deref()).await?))
}

async fn table_by_code(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<TableView>, AppError> {
    Ok(Json(state.tables.by_code(&code).await?))
}

async fn create_order(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PlaceOrder>,
) -> Result<(StatusCode, Json<PublicOrderView>), AppError> {
    let detail = state.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(detail.into())))
}

async fn track_order(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<PublicOrderView>, AppError> {
    Ok(Json(state.orders.get_detail(&id).await?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{order, product};
    use crate::engine::{snapshot_item, Totals};
    use crate::orders::TableRef;

    #[test]
    fn tracking_view_reports_both_currencies() {
        let items = vec![snapshot_item("ODR_1", &product("P1", 500, 2_000_000, true), 2).unwrap()];
        let totals = Totals::of(&items).unwrap();
        let mut o = order("ODR_1");
        o.subtotal_usd = totals.subtotal_usd;
        o.subtotal_khr = totals.subtotal_khr;
        o.total_usd = totals.total_usd;
        o.total_khr = totals.total_khr;

        let view = PublicOrderView::from(OrderDetail {
            order: o,
            table: TableRef { id: "TBL_1".into(), code: "TB001".into(), name: "Window".into() },
            items,
        });
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["order"]["status"], "PENDING");
        assert_eq!(json["order"]["table"]["code"], "TB001");
        assert_eq!(json["order"]["payment"]["method"], "COD");
        assert_eq!(json["items"][0]["qty"], 2);
        assert_eq!(json["items"][0]["line_total"]["khr"], 4_000_000);
        assert_eq!(json["summary"]["item_count"], 1);
        assert_eq!(json["summary"]["total"]["usd"], "10.00");
        assert_eq!(json["summary"]["total"]["khr"], 4_000_000);
    }
}
