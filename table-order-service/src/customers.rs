use chrono::Utc;
use diesel::dsl::sql;
use diesel::expression::SqlLiteral;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Varchar};
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::info;
use uuid::Uuid;

use crate::db::DbPool;
use crate::engine::new_id;
use crate::error::AppError;
use crate::models::Customer;
use crate::schema::customers;

/// How an incoming order identifies its customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityKey {
    External { external_id: String, handle: Option<String> },
    Handle(String),
    Guest,
}

impl IdentityKey {
    /// Blank strings count as absent.
    pub fn classify(external_id: Option<&str>, handle: Option<&str>) -> Self {
        let clean = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        match (clean(external_id), clean(handle)) {
            (Some(external_id), handle) => IdentityKey::External { external_id, handle },
            (None, Some(handle)) => IdentityKey::Handle(handle),
            (None, None) => IdentityKey::Guest,
        }
    }
}

/// Identity reported by the messaging platform (e.g. a `/start` message).
#[derive(Debug, Clone)]
pub struct PlatformIdentity {
    pub external_id: String,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub table_code: Option<String>,
}

fn fresh_customer(external_id: String, handle: Option<String>) -> Customer {
    let now = Utc::now();
    Customer {
        id: new_id("CUS"),
        external_id,
        handle,
        display_name: None,
        last_table_code: None,
        created_at: now,
        last_seen_at: now,
    }
}

/// Guest suffixes come from a v4 UUID (OS randomness), never a counter.
pub fn guest_customer() -> Customer {
    let suffix = Uuid::new_v4().simple().to_string();
    fresh_customer(format!("GUEST_{suffix}"), Some(format!("guest_{suffix}")))
}

/// Returns the matching customer or creates one. Runs on the caller's
/// connection so it can join the order transaction.
pub async fn resolve_or_create(conn: &mut AsyncPgConnection, key: IdentityKey) -> Result<Customer, AppError> {
    match key {
        IdentityKey::External { external_id, handle } => {
            // Two first orders from the same user can race here; the upsert
            // makes the later one pick up the row the earlier one wrote.
            let row = fresh_customer(external_id, handle);
            Ok(diesel::insert_into(customers::table)
                .values(&row)
                .on_conflict(customers::external_id)
                .do_update()
                .set((
                    customers::handle.eq(keep_stored_when_absent("handle")),
                    customers::last_seen_at.eq(excluded(customers::last_seen_at)),
                ))
                .get_result::<Customer>(conn)
                .await?)
        }
        IdentityKey::Handle(handle) => {
            let existing = customers::table
                .filter(customers::handle.eq(&handle))
                .order(customers::created_at.asc())
                .first::<Customer>(conn)
                .await
                .optional()?;

            match existing {
                Some(customer) => Ok(customer),
                None => insert(conn, fresh_customer(new_id("U"), Some(handle))).await,
            }
        }
        IdentityKey::Guest => insert(conn, guest_customer()).await,
    }
}

/// Upsert value for a nullable column: the incoming value, or the stored
/// one when the incoming row leaves it NULL.
fn keep_stored_when_absent(column: &str) -> SqlLiteral<Nullable<Varchar>> {
    sql(&format!("COALESCE(excluded.{column}, customers.{column})"))
}

async fn insert(conn: &mut AsyncPgConnection, customer: Customer) -> Result<Customer, AppError> {
    let created = diesel::insert_into(customers::table)
        .values(&customer)
        .get_result::<Customer>(conn)
        .await?;
    info!(customer_id = %created.id, external_id = %created.external_id, "created customer identity");
    Ok(created)
}

/// Insert-or-update keyed on the external id. A table code in the event is
/// stamped as the last seen table; an absent one keeps the stored value.
pub async fn upsert_from_platform(
    conn: &mut AsyncPgConnection,
    identity: PlatformIdentity,
) -> Result<Customer, AppError> {
    let mut row = fresh_customer(identity.external_id, identity.handle);
    row.display_name = identity.display_name;
    row.last_table_code = identity.table_code;

    let customer = diesel::insert_into(customers::table)
        .values(&row)
        .on_conflict(customers::external_id)
        .do_update()
        .set((
            customers::handle.eq(excluded(customers::handle)),
            customers::display_name.eq(excluded(customers::display_name)),
            customers::last_table_code.eq(keep_stored_when_absent("last_table_code")),
            customers::last_seen_at.eq(excluded(customers::last_seen_at)),
        ))
        .get_result::<Customer>(conn)
        .await?;
    Ok(customer)
}

pub async fn last_table_code(conn: &mut AsyncPgConnection, external_id: &str) -> Result<Option<String>, AppError> {
    let code = customers::table
        .filter(customers::external_id.eq(external_id))
        .select(customers::last_table_code)
        .first::<Option<String>>(conn)
        .await
        .optional()?;
    Ok(code.flatten())
}

#[derive(Clone)]
pub struct CustomerDirectory {
    pool: DbPool,
}

impl CustomerDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<Customer>, AppError> {
        let mut conn = self.pool.get().await?;
        Ok(customers::table
            .order(customers::created_at.desc())
            .limit(limit.clamp(1, 100))
            .load::<Customer>(&mut conn)
            .await?)
    }

    pub async fn get(&self, id: &str) -> Result<Customer, AppError> {
        let mut conn = self.pool.get().await?;
        customers::table
            .find(id)
            .first::<Customer>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Customer {id}")))
    }
}
