//! Transactional side of the order engine. Every operation that writes more
//! than one row runs in a single diesel-async transaction; item mutations
//! lock the parent order row first so totals are recomputed from a stable
//! item set.

use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use shared::{OrderAction, OrderStatus, OutboxEvent, PaymentMethod, PaymentStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::customers::{self, IdentityKey};
use crate::db::DbPool;
use crate::engine::{self, LineRequest, Totals};
use crate::error::AppError;
use crate::models::*;
use crate::schema::{dining_tables, order_items, orders, outbox_events, products};

const ORDER_NO_KEY: &str = "orders_order_no_key";
const MAX_CREATE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrder {
    pub table_code: String,
    #[serde(default, alias = "telegram_username")]
    pub customer_handle: Option<String>,
    #[serde(default, alias = "telegram_user_id")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub items: Vec<LineRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRef {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub table: TableRef,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub table_id: Option<String>,
    pub limit: Option<i64>,
}

/// Failure inside the create transaction. A clash on the order number is
/// kept apart so the whole transaction can be retried.
enum CreateError {
    OrderNoTaken,
    App(AppError),
}

impl From<DieselError> for CreateError {
    fn from(e: DieselError) -> Self {
        CreateError::App(e.into())
    }
}

impl From<AppError> for CreateError {
    fn from(e: AppError) -> Self {
        CreateError::App(e)
    }
}

#[derive(Clone)]
pub struct OrderEngine {
    pool: DbPool,
    outbox_wake: Arc<Notify>,
}

impl OrderEngine {
    pub fn new(pool: DbPool, outbox_wake: Arc<Notify>) -> Self {
        Self { pool, outbox_wake }
    }

    pub async fn create_order(&self, request: PlaceOrder) -> Result<OrderDetail, AppError> {
        let mut conn = self.pool.get().await?;

        let mut attempt = 1;
        let detail = loop {
            let request = request.clone();
            let result = conn
                .transaction::<_, CreateError, _>(|conn| Box::pin(place(conn, request)))
                .await;

            match result {
                Ok(detail) => break detail,
                Err(CreateError::OrderNoTaken) if attempt < MAX_CREATE_ATTEMPTS => {
                    warn!(attempt, "order number collision, retrying");
                    attempt += 1;
                }
                Err(CreateError::OrderNoTaken) => {
                    return Err(AppError::Conflict("could not allocate a unique order number".to_string()))
                }
                Err(CreateError::App(e)) => return Err(e),
            }
        };

        info!(
            order_id = %detail.order.id,
            order_no = %detail.order.order_no,
            table = %detail.table.code,
            items = detail.items.len(),
            "order created"
        );
        self.outbox_wake.notify_one();
        Ok(detail)
    }

    pub async fn add_item(&self, order_id: &str, line: LineRequest) -> Result<OrderDetail, AppError> {
        engine::ensure_quantity(line.qty)?;
        let mut conn = self.pool.get().await?;
        let order_id = order_id.to_string();

        conn.transaction::<_, AppError, _>(|conn| {
            Box::pin(async move {
                let order = lock_order(conn, &order_id).await?;

                let product = products::table
                    .find(&line.product_id)
                    .first::<Product>(conn)
                    .await
                    .optional()?
                    .filter(|p| p.is_active)
                    .ok_or_else(|| AppError::ProductsUnavailable(vec![line.product_id.clone()]))?;

                let item = engine::snapshot_item(&order_id, &product, line.qty)?;
                diesel::insert_into(order_items::table).values(&item).execute(conn).await?;

                let order = recalculate_totals(conn, &order).await?;
                load_detail(conn, order).await
            })
        })
        .await
    }

    /// Re-sums the stored items under the order lock.
    pub async fn recalculate(&self, order_id: &str) -> Result<Order, AppError> {
        let mut conn = self.pool.get().await?;
        let order_id = order_id.to_string();

        conn.transaction::<_, AppError, _>(|conn| {
            Box::pin(async move {
                let order = lock_order(conn, &order_id).await?;
                recalculate_totals(conn, &order).await
            })
        })
        .await
    }

    pub async fn update_item_quantity(&self, item_id: &str, qty: i32) -> Result<OrderDetail, AppError> {
        engine::ensure_quantity(qty)?;
        let mut conn = self.pool.get().await?;
        let item_id = item_id.to_string();

        conn.transaction::<_, AppError, _>(|conn| {
            Box::pin(async move {
                let (order, mut item) = lock_item(conn, &item_id).await?;
                engine::set_quantity(&mut item, qty)?;

                diesel::update(order_items::table.find(&item.id))
                    .set((
                        order_items::qty.eq(item.qty),
                        order_items::line_total_usd.eq(item.line_total_usd),
                        order_items::line_total_khr.eq(item.line_total_khr),
                    ))
                    .execute(conn)
                    .await?;

                let order = recalculate_totals(conn, &order).await?;
                load_detail(conn, order).await
            })
        })
        .await
    }

    pub async fn delete_item(&self, item_id: &str) -> Result<OrderDetail, AppError> {
        let mut conn = self.pool.get().await?;
        let item_id = item_id.to_string();

        conn.transaction::<_, AppError, _>(|conn| {
            Box::pin(async move {
                let (order, item) = lock_item(conn, &item_id).await?;
                diesel::delete(order_items::table.find(&item.id)).execute(conn).await?;

                let order = recalculate_totals(conn, &order).await?;
                load_detail(conn, order).await
            })
        })
        .await
    }

    /// PENDING is the only state that accepts an action. The row lock makes
    /// a concurrent accept and cancel resolve to exactly one winner.
    pub async fn transition_status(&self, order_id: &str, action: OrderAction) -> Result<Order, AppError> {
        let mut conn = self.pool.get().await?;
        let order_id = order_id.to_string();

        let order = conn
            .transaction::<_, AppError, _>(|conn| {
                Box::pin(async move {
                    let current = lock_order(conn, &order_id).await?;
                    let next = current.status.apply(action)?;

                    Ok(diesel::update(
                        orders::table
                            .find(&order_id)
                            .filter(orders::status.eq(OrderStatus::Pending)),
                    )
                    .set((orders::status.eq(next), orders::updated_at.eq(Utc::now())))
                    .get_result::<Order>(conn)
                    .await?)
                })
            })
            .await?;

        info!(order_id = %order.id, status = %order.status, "order status changed");
        Ok(order)
    }

    /// Administrative override; values are stored as given.
    pub async fn update_order_fields(&self, order_id: &str, mut changes: OrderChanges) -> Result<Order, AppError> {
        let amounts = [
            ("subtotal_usd", changes.subtotal_usd),
            ("subtotal_khr", changes.subtotal_khr),
            ("total_usd", changes.total_usd),
            ("total_khr", changes.total_khr),
        ];
        if let Some((field, _)) = amounts.iter().find(|(_, v)| v.is_some_and(|v| v < 0)) {
            return Err(AppError::InvalidInput(format!("{field} must be >= 0")));
        }
        changes.updated_at = Some(Utc::now());

        let mut conn = self.pool.get().await?;
        diesel::update(orders::table.find(order_id))
            .set(&changes)
            .get_result::<Order>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| order_not_found(order_id))
    }

    pub async fn delete_order(&self, order_id: &str) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;
        let deleted = diesel::delete(orders::table.find(order_id)).execute(&mut conn).await?;
        if deleted == 0 {
            return Err(order_not_found(order_id));
        }
        info!(order_id, "order deleted");
        Ok(())
    }

    pub async fn get_detail(&self, order_id: &str) -> Result<OrderDetail, AppError> {
        let mut conn = self.pool.get().await?;
        let order = orders::table
            .find(order_id)
            .first::<Order>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| order_not_found(order_id))?;
        load_detail(&mut conn, order).await
    }

    pub async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, AppError> {
        let mut conn = self.pool.get().await?;
        let mut query = orders::table.into_boxed();

        if let Some(status) = filter.status {
            query = query.filter(orders::status.eq(status));
        }
        if let Some(method) = filter.payment_method {
            query = query.filter(orders::payment_method.eq(method));
        }
        if let Some(payment) = filter.payment_status {
            query = query.filter(orders::payment_status.eq(payment));
        }
        if let Some(table_id) = filter.table_id {
            query = query.filter(orders::table_id.eq(table_id));
        }

        Ok(query
            .order(orders::created_at.desc())
            .limit(filter.limit.unwrap_or(50).clamp(1, 100))
            .load::<Order>(&mut conn)
            .await?)
    }
}

fn order_not_found(order_id: &str) -> AppError {
    AppError::NotFound(format!("Order {order_id}"))
}

async fn place(conn: &mut AsyncPgConnection, request: PlaceOrder) -> Result<OrderDetail, CreateError> {
    let table = dining_tables::table
        .filter(dining_tables::code.eq(request.table_code.trim()))
        .first::<DiningTable>(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("Table {}", request.table_code.trim())))?;
    if !table.is_active {
        return Err(AppError::Unavailable("Table is inactive".to_string()).into());
    }

    engine::ensure_lines(&request.items)?;

    let key = IdentityKey::classify(request.external_id.as_deref(), request.customer_handle.as_deref());
    let customer = customers::resolve_or_create(conn, key).await?;

    let ids: Vec<String> = request.items.iter().map(|l| l.product_id.clone()).collect();
    let catalog: HashMap<String, Product> = products::table
        .filter(products::id.eq_any(ids))
        .load::<Product>(conn)
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    let order_id = engine::new_id("ODR");
    let items = engine::build_items(&order_id, &request.items, &catalog)?;
    let totals = Totals::of(&items)?;

    let now = Utc::now();
    let order = Order {
        id: order_id,
        order_no: engine::order_number(now, &mut rand::thread_rng()),
        table_id: table.id.clone(),
        customer_id: customer.id,
        status: OrderStatus::Pending,
        payment_method: request.payment_method.unwrap_or_default(),
        payment_status: PaymentStatus::Unpaid,
        subtotal_usd: totals.subtotal_usd,
        subtotal_khr: totals.subtotal_khr,
        total_usd: totals.total_usd,
        total_khr: totals.total_khr,
        note: request.note.filter(|n| !n.trim().is_empty()),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(orders::table)
        .values(&order)
        .execute(conn)
        .await
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                if info.constraint_name() == Some(ORDER_NO_KEY) =>
            {
                CreateError::OrderNoTaken
            }
            other => other.into(),
        })?;

    diesel::insert_into(order_items::table).values(&items).execute(conn).await?;

    let notice = engine::notice(&order, &table.code, &items);
    let event = OutboxEvent::order_created(&notice).map_err(|e| AppError::Internal(e.into()))?;
    diesel::insert_into(outbox_events::table)
        .values(&DbOutboxEvent::from(event))
        .execute(conn)
        .await?;

    Ok(OrderDetail {
        order,
        table: TableRef { id: table.id, code: table.code, name: table.name },
        items,
    })
}

/// `SELECT ... FOR UPDATE` on the order row.
async fn lock_order(conn: &mut AsyncPgConnection, order_id: &str) -> Result<Order, AppError> {
    orders::table
        .find(order_id)
        .for_update()
        .first::<Order>(conn)
        .await
        .optional()?
        .ok_or_else(|| order_not_found(order_id))
}

/// Locks the item's parent order, then re-reads the item under that lock.
async fn lock_item(conn: &mut AsyncPgConnection, item_id: &str) -> Result<(Order, OrderItem), AppError> {
    let missing = || AppError::NotFound(format!("Order item {item_id}"));

    let order_id = order_items::table
        .find(item_id)
        .select(order_items::order_id)
        .first::<String>(conn)
        .await
        .optional()?
        .ok_or_else(missing)?;
    let order = lock_order(conn, &order_id).await?;

    let item = order_items::table
        .find(item_id)
        .select(OrderItem::as_select())
        .first::<OrderItem>(conn)
        .await
        .optional()?
        .ok_or_else(missing)?;
    Ok((order, item))
}

/// Re-sums the order's current items into subtotal and total for both
/// currencies. `order` is the row as read under the caller's lock; nothing is
/// written when its totals already match.
pub async fn recalculate_totals(conn: &mut AsyncPgConnection, order: &Order) -> Result<Order, AppError> {
    let items = order_items::table
        .filter(order_items::order_id.eq(&order.id))
        .select(OrderItem::as_select())
        .load::<OrderItem>(conn)
        .await?;
    let totals = Totals::of(&items)?;
    if totals.matches(order) {
        return Ok(order.clone());
    }

    diesel::update(orders::table.find(&order.id))
        .set((
            orders::subtotal_usd.eq(totals.subtotal_usd),
            orders::subtotal_khr.eq(totals.subtotal_khr),
            orders::total_usd.eq(totals.total_usd),
            orders::total_khr.eq(totals.total_khr),
            orders::updated_at.eq(Utc::now()),
        ))
        .get_result::<Order>(conn)
        .await
        .optional()?
        .ok_or_else(|| order_not_found(&order.id))
}

async fn load_detail(conn: &mut AsyncPgConnection, order: Order) -> Result<OrderDetail, AppError> {
    let table = dining_tables::table
        .find(&order.table_id)
        .first::<DiningTable>(conn)
        .await?;
    let items = order_items::table
        .filter(order_items::order_id.eq(&order.id))
        .order(order_items::line_no.asc())
        .select(OrderItem::as_select())
        .load::<OrderItem>(conn)
        .await?;

    Ok(OrderDetail {
        order,
        table: TableRef { id: table.id, code: table.code, name: table.name },
        items,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::engine::new_id;
    use std::collections::HashSet;

    pub(crate) struct Seed {
        pub(crate) table_code: String,
        pub(crate) product_id: String,
        pub(crate) inactive_product_id: String,
    }

    pub(crate) async fn seed(pool: &DbPool) -> Seed {
        let mut conn = pool.get().await.unwrap();
        let now = Utc::now();
        let category = Category {
            id: new_id("CAT"),
            name: new_id("Noodles"),
            name_lc: new_id("noodles"),
            is_active: true,
            sort_order: 0,
            created_at: now,
        };
        diesel::insert_into(crate::schema::categories::table)
            .values(&category)
            .execute(&mut conn)
            .await
            .unwrap();

        let mut active = engine::tests::product(&new_id("PRD"), 500, 2_000_000, true);
        active.category_id = category.id.clone();
        let mut inactive = engine::tests::product(&new_id("PRD"), 300, 1_200, false);
        inactive.category_id = category.id.clone();
        diesel::insert_into(products::table)
            .values(&vec![active.clone(), inactive.clone()])
            .execute(&mut conn)
            .await
            .unwrap();

        let code = new_id("TB");
        let table = DiningTable {
            id: new_id("TBL"),
            code: code.clone(),
            name: code.clone(),
            is_active: true,
            created_at: now,
        };
        diesel::insert_into(dining_tables::table).values(&table).execute(&mut conn).await.unwrap();

        Seed { table_code: code, product_id: active.id, inactive_product_id: inactive.id }
    }

    pub(crate) fn place_order(seed: &Seed, lines: Vec<(&str, i32)>) -> PlaceOrder {
        PlaceOrder {
            table_code: seed.table_code.clone(),
            customer_handle: Some("sokha".to_string()),
            external_id: None,
            payment_method: None,
            note: Some("no chili".to_string()),
            items: lines
                .into_iter()
                .map(|(id, qty)| LineRequest { product_id: id.to_string(), qty })
                .collect(),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn creates_pending_order_with_outbox_event() {
        let pool = test_pool().await;
        let seed = seed(&pool).await;
        let engine = OrderEngine::new(pool.clone(), Arc::new(Notify::new()));

        let detail = engine
            .create_order(place_order(&seed, vec![(seed.product_id.as_str(), 2)]))
            .await
            .unwrap();

        assert_eq!(detail.order.status, OrderStatus::Pending);
        assert_eq!(detail.order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(detail.order.subtotal_usd, 1000);
        assert_eq!(detail.order.total_usd, 1000);
        assert_eq!(detail.order.total_khr, 4_000_000);
        assert_eq!(detail.items[0].line_total_khr, 4_000_000);

        let mut conn = pool.get().await.unwrap();
        let events: i64 = outbox_events::table
            .filter(outbox_events::aggregate_id.eq(&detail.order.id))
            .count()
            .get_result(&mut conn)
            .await
            .unwrap();
        assert_eq!(events, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn inactive_product_rolls_back_everything() {
        let pool = test_pool().await;
        let seed = seed(&pool).await;
        let engine = OrderEngine::new(pool.clone(), Arc::new(Notify::new()));

        let err = engine
            .create_order(place_order(
                &seed,
                vec![(seed.product_id.as_str(), 1), (seed.inactive_product_id.as_str(), 1)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProductsUnavailable(ids) if ids == vec![seed.inactive_product_id.clone()]));

        let mut conn = pool.get().await.unwrap();
        let table_id: String = dining_tables::table
            .filter(dining_tables::code.eq(&seed.table_code))
            .select(dining_tables::id)
            .first(&mut conn)
            .await
            .unwrap();
        let orders_for_table: i64 = orders::table
            .filter(orders::table_id.eq(table_id))
            .count()
            .get_result(&mut conn)
            .await
            .unwrap();
        assert_eq!(orders_for_table, 0);
    }

    #[tokio::test]
    #[ignore]
    async fn item_edits_keep_totals_in_sync() {
        let pool = test_pool().await;
        let seed = seed(&pool).await;
        let engine = OrderEngine::new(pool.clone(), Arc::new(Notify::new()));

        let detail = engine
            .create_order(place_order(&seed, vec![(seed.product_id.as_str(), 2)]))
            .await
            .unwrap();
        let item_id = detail.items[0].id.clone();

        let updated = engine.update_item_quantity(&item_id, 5).await.unwrap();
        assert_eq!(updated.order.total_usd, 2_500);
        assert_eq!(updated.order.total_khr, 10_000_000);
        assert!(Totals::of(&updated.items).unwrap().matches(&updated.order));

        let grown = engine
            .add_item(&detail.order.id, LineRequest { product_id: seed.product_id.clone(), qty: 1 })
            .await
            .unwrap();
        assert_eq!(grown.items.len(), 2);
        assert_eq!(grown.order.total_usd, 3_000);

        let err = engine.update_item_quantity(&item_id, 0).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        for item in &grown.items {
            engine.delete_item(&item.id).await.unwrap();
        }
        let emptied = engine.get_detail(&detail.order.id).await.unwrap();
        assert!(emptied.items.is_empty());
        assert_eq!(emptied.order.total_usd, 0);
        assert_eq!(emptied.order.total_khr, 0);
    }

    #[tokio::test]
    #[ignore]
    async fn only_pending_orders_transition() {
        let pool = test_pool().await;
        let seed = seed(&pool).await;
        let engine = OrderEngine::new(pool.clone(), Arc::new(Notify::new()));
        let detail = engine
            .create_order(place_order(&seed, vec![(seed.product_id.as_str(), 1)]))
            .await
            .unwrap();

        let accepted = engine.transition_status(&detail.order.id, OrderAction::Accept).await.unwrap();
        assert_eq!(accepted.status, OrderStatus::Accepted);

        let err = engine.transition_status(&detail.order.id, OrderAction::Cancel).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition { current: OrderStatus::Accepted, action: OrderAction::Cancel }
        ));

        let err = engine.transition_status("ODR_missing", OrderAction::Accept).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn admin_override_rejects_negative_amounts() {
        let pool = test_pool().await;
        let seed = seed(&pool).await;
        let engine = OrderEngine::new(pool.clone(), Arc::new(Notify::new()));
        let detail = engine
            .create_order(place_order(&seed, vec![(seed.product_id.as_str(), 1)]))
            .await
            .unwrap();

        let bad = OrderChanges { total_usd: Some(-1), ..Default::default() };
        assert!(matches!(
            engine.update_order_fields(&detail.order.id, bad).await,
            Err(AppError::InvalidInput(_))
        ));

        let paid = OrderChanges {
            status: Some(OrderStatus::Completed),
            payment_status: Some(PaymentStatus::Paid),
            ..Default::default()
        };
        let order = engine.update_order_fields(&detail.order.id, paid).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.total_usd, 500);
    }

    #[tokio::test]
    #[ignore]
    async fn concurrent_orders_get_distinct_numbers() {
        let pool = test_pool().await;
        let seed = Arc::new(seed(&pool).await);
        let engine = OrderEngine::new(pool.clone(), Arc::new(Notify::new()));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let engine = engine.clone();
                let seed = seed.clone();
                tokio::spawn(async move {
                    engine
                        .create_order(place_order(&seed, vec![(seed.product_id.as_str(), 1)]))
                        .await
                        .unwrap()
                        .order
                        .order_no
                })
            })
            .collect();

        let mut numbers = HashSet::new();
        for handle in handles {
            assert!(numbers.insert(handle.await.unwrap()));
        }
        assert_eq!(numbers.len(), 20);
    }

    #[tokio::test]
    #[ignore]
    async fn first_orders_from_a_new_customer_share_one_identity() {
        let pool = test_pool().await;
        let seed = Arc::new(seed(&pool).await);
        let engine = OrderEngine::new(pool.clone(), Arc::new(Notify::new()));
        let external_id = new_id("TG");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let seed = seed.clone();
                let external_id = external_id.clone();
                tokio::spawn(async move {
                    let mut request = place_order(&seed, vec![(seed.product_id.as_str(), 1)]);
                    request.external_id = Some(external_id);
                    engine.create_order(request).await
                })
            })
            .collect();

        let mut customer_ids = HashSet::new();
        for handle in handles {
            let detail = handle.await.unwrap().unwrap();
            customer_ids.insert(detail.order.customer_id);
        }
        assert_eq!(customer_ids.len(), 1);

        let mut conn = pool.get().await.unwrap();
        let rows: i64 = crate::schema::customers::table
            .filter(crate::schema::customers::external_id.eq(&external_id))
            .count()
            .get_result(&mut conn)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn detail_lists_items_in_the_order_they_were_added() {
        let pool = test_pool().await;
        let seed = seed(&pool).await;
        let engine = OrderEngine::new(pool.clone(), Arc::new(Notify::new()));
        let p = seed.product_id.as_str();

        let created = engine
            .create_order(place_order(&seed, vec![(p, 4), (p, 1), (p, 3), (p, 2)]))
            .await
            .unwrap();
        engine
            .add_item(&created.order.id, LineRequest { product_id: seed.product_id.clone(), qty: 7 })
            .await
            .unwrap();

        let detail = engine.get_detail(&created.order.id).await.unwrap();
        let qtys: Vec<i32> = detail.items.iter().map(|item| item.qty).collect();
        assert_eq!(qtys, vec![4, 1, 3, 2, 7]);

        let created_ids: Vec<&str> = created.items.iter().map(|item| item.id.as_str()).collect();
        let stored_ids: Vec<&str> = detail.items[..4].iter().map(|item| item.id.as_str()).collect();
        assert_eq!(created_ids, stored_ids);
    }
}
