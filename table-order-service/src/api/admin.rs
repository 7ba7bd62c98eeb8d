use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use shared::OrderAction;

use super::extract::{ApiJson, ApiQuery};
use super::AppState;
use crate::auth::AdminOnly;
use crate::catalog::{CategoryUpdate, NewCategory, NewProduct, ProductUpdate};
use crate::engine::LineRequest;
use crate::error::AppError;
use crate::models::{Category, Customer, Order, OrderChanges, Product};
use crate::orders::{OrderDetail, OrderFilter};
use crate::tables::{NewTable, TableUpdate, TableView};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/products", post(create_product))
        .route("/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/tables", post(create_table))
        .route("/tables/:id", get(get_table).put(update_table).delete(delete_table))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order).put(update_order).delete(delete_order))
        .route("/orders/:id/accept", post(accept_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/recalculate", post(recalculate_order))
        .route("/order-items", post(add_order_item))
        .route("/order-items/:id", put(update_order_item).delete(delete_order_item))
        .route("/customers", get(list_customers))
        .route("/customers/:id", get(get_customer))
}

async fn create_category(
    _admin: AdminOnly,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewCategory>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    Ok((StatusCode::CREATED, Json(state.catalog.create_category(input).await?)))
}

async fn update_category(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<CategoryUpdate>,
) -> Result<Json<Category>, AppError> {
    Ok(Json(state.catalog.update_category(&id, update).await?))
}

async fn delete_category(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_category(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_product(
    _admin: AdminOnly,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    Ok((StatusCode::CREATED, Json(state.catalog.create_product(input).await?)))
}

async fn get_product(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.get_product(&id).await?))
}

async fn update_product(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<ProductUpdate>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.update_product(&id, update).await?))
}

async fn delete_product(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_product(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_table(
    _admin: AdminOnly,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewTable>,
) -> Result<(StatusCode, Json<TableView>), AppError> {
    Ok((StatusCode::CREATED, Json(state.tables.create(input).await?)))
}

async fn get_table(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TableView>, AppError> {
    Ok(Json(state.tables.get(&id).await?))
}

async fn update_table(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<TableUpdate>,
) -> Result<Json<TableView>, AppError> {
    Ok(Json(state.tables.update(&id, update).await?))
}

async fn delete_table(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.tables.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_orders(
    _admin: AdminOnly,
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<OrderFilter>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.orders.list_orders(filter).await?))
}

async fn get_order(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetail>, AppError> {
    Ok(Json(state.orders.get_detail(&id).await?))
}

async fn update_order(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(changes): ApiJson<OrderChanges>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.update_order_fields(&id, changes).await?))
}

async fn delete_order(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.orders.delete_order(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn accept_order(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.transition_status(&id, OrderAction::Accept).await?))
}

async fn cancel_order(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.transition_status(&id, OrderAction::Cancel).await?))
}

async fn recalculate_order(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.recalculate(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct NewOrderItem {
    pub order_id: String,
    #[serde(flatten)]
    pub line: LineRequest,
}

#[derive(Debug, Deserialize)]
pub struct QuantityUpdate {
    pub qty: i32,
}

async fn add_order_item(
    _admin: AdminOnly,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewOrderItem>,
) -> Result<(StatusCode, Json<OrderDetail>), AppError> {
    let detail = state.orders.add_item(&input.order_id, input.line).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn update_order_item(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<QuantityUpdate>,
) -> Result<Json<OrderDetail>, AppError> {
    Ok(Json(state.orders.update_item_quantity(&id, update.qty).await?))
}

async fn delete_order_item(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetail>, AppError> {
    Ok(Json(state.orders.delete_item(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub limit: Option<i64>,
}

async fn list_customers(
    _admin: AdminOnly,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CustomerQuery>,
) -> Result<Json<Vec<Customer>>, AppError> {
    Ok(Json(state.customers.list(query.limit.unwrap_or(50)).await?))
}

async fn get_customer(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Customer>, AppError> {
    Ok(Json(state.customers.get(&id).await?))
}
