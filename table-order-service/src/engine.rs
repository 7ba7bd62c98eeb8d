//! Order rules that do not touch storage: item snapshots, two-currency
//! totals, order numbers and identifiers.
//!
//! Totals are summed per currency from the item line totals. KHR is never
//! derived from USD through an exchange rate, so both sums are exact.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use shared::{NoticeLine, OrderNotice};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Order, OrderItem, Product};

#[derive(Debug, Clone, Deserialize)]
pub struct LineRequest {
    pub product_id: String,
    pub qty: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub subtotal_usd: i64,
    pub subtotal_khr: i64,
    pub total_usd: i64,
    pub total_khr: i64,
}

impl Totals {
    /// No tax or discount layer exists, so subtotal and total are the same sum.
    pub fn of<'a>(items: impl IntoIterator<Item = &'a OrderItem>) -> Result<Self, AppError> {
        let (usd, khr) = items.into_iter().try_fold((0i64, 0i64), |(usd, khr), item| {
            Some((usd.checked_add(item.line_total_usd)?, khr.checked_add(item.line_total_khr)?))
        })
        .ok_or_else(amount_overflow)?;

        Ok(Self { subtotal_usd: usd, subtotal_khr: khr, total_usd: usd, total_khr: khr })
    }

    pub fn matches(&self, order: &Order) -> bool {
        order.subtotal_usd == self.subtotal_usd
            && order.subtotal_khr == self.subtotal_khr
            && order.total_usd == self.total_usd
            && order.total_khr == self.total_khr
    }
}

fn amount_overflow() -> AppError {
    AppError::InvalidInput("amount is too large".to_string())
}

pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// `ORD-<yyyymmddHHMMSS>-<12 hex>`. 48 random bits per second keep numbers
/// unique without a shared counter; the unique index catches the rest.
pub fn order_number<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: u64 = rng.gen::<u64>() & 0xFFFF_FFFF_FFFF;
    format!("ORD-{}-{:012X}", now.format("%Y%m%d%H%M%S"), suffix)
}

pub fn ensure_quantity(qty: i32) -> Result<(), AppError> {
    if qty <= 0 {
        return Err(AppError::invalid_quantity());
    }
    Ok(())
}

/// Fails when the request carries no lines at all.
pub fn ensure_lines(lines: &[LineRequest]) -> Result<(), AppError> {
    if lines.is_empty() {
        return Err(AppError::InvalidInput("Order items are required".to_string()));
    }
    Ok(())
}

/// Every requested id that is missing from `products` or inactive, in
/// request order and without duplicates.
pub fn unavailable_products(lines: &[LineRequest], products: &HashMap<String, Product>) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for line in lines {
        let orderable = products.get(&line.product_id).is_some_and(|p| p.is_active);
        if !orderable && !missing.contains(&line.product_id) {
            missing.push(line.product_id.clone());
        }
    }
    missing
}

/// Freezes the product's name and both prices onto a new item.
pub fn snapshot_item(order_id: &str, product: &Product, qty: i32) -> Result<OrderItem, AppError> {
    ensure_quantity(qty)?;
    let mut item = OrderItem {
        id: new_id("ITM"),
        order_id: order_id.to_string(),
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        product_name_lc: product.name_lc.clone(),
        unit_price_usd: product.price_usd,
        unit_price_khr: product.price_khr,
        qty,
        line_total_usd: 0,
        line_total_khr: 0,
    };
    set_quantity(&mut item, qty)?;
    Ok(item)
}

/// Changes the quantity and recomputes the line totals from the frozen unit
/// prices.
pub fn set_quantity(item: &mut OrderItem, qty: i32) -> Result<(), AppError> {
    ensure_quantity(qty)?;
    let usd = item.unit_price_usd.checked_mul(i64::from(qty)).ok_or_else(amount_overflow)?;
    let khr = item.unit_price_khr.checked_mul(i64::from(qty)).ok_or_else(amount_overflow)?;
    item.qty = qty;
    item.line_total_usd = usd;
    item.line_total_khr = khr;
    Ok(())
}

/// Validates the requested lines against the loaded catalog and builds the
/// item snapshots. Unavailable products are reported as one batch before any
/// quantity is looked at.
pub fn build_items(
    order_id: &str,
    lines: &[LineRequest],
    products: &HashMap<String, Product>,
) -> Result<Vec<OrderItem>, AppError> {
    ensure_lines(lines)?;

    let missing = unavailable_products(lines, products);
    if !missing.is_empty() {
        return Err(AppError::ProductsUnavailable(missing));
    }

    lines
        .iter()
        .map(|line| {
            let product = products
                .get(&line.product_id)
                .ok_or_else(|| AppError::ProductsUnavailable(vec![line.product_id.clone()]))?;
            snapshot_item(order_id, product, line.qty)
        })
        .collect()
}

pub fn notice(order: &Order, table_code: &str, items: &[OrderItem]) -> OrderNotice {
    OrderNotice {
        order_id: order.id.clone(),
        order_no: order.order_no.clone(),
        table_code: table_code.to_string(),
        note: order.note.clone(),
        items: items
            .iter()
            .map(|item| NoticeLine {
                product_name: item.product_name.clone(),
                qty: item.qty,
                unit_price_usd: item.unit_price_usd,
                line_total_usd: item.line_total_usd,
                line_total_khr: item.line_total_khr,
            })
            .collect(),
        total_usd: order.total_usd,
        total_khr: order.total_khr,
    }
}
