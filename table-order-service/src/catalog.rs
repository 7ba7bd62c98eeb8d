use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use tracing::info;

use crate::db::DbPool;
use crate::engine::new_id;
use crate::error::AppError;
use crate::models::{Category, CategoryChanges, Product, ProductChanges};
use crate::schema::{categories, products};

/// Admin forms send flags as JSON booleans, numbers or strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlagInput {
    Bool(bool),
    Number(i64),
    Text(String),
}

impl FlagInput {
    pub fn to_bool(&self) -> Result<bool, AppError> {
        match self {
            FlagInput::Bool(b) => Ok(*b),
            FlagInput::Number(1) => Ok(true),
            FlagInput::Number(0) => Ok(false),
            FlagInput::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Ok(true),
                "false" | "0" | "off" | "no" => Ok(false),
                _ => Err(bad_flag()),
            },
            FlagInput::Number(_) => Err(bad_flag()),
        }
    }
}

fn bad_flag() -> AppError {
    AppError::InvalidInput("unparseable boolean flag".to_string())
}

pub fn parse_flag(raw: Option<&FlagInput>) -> Result<Option<bool>, AppError> {
    raw.map(FlagInput::to_bool).transpose()
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Explicit search name if given, otherwise the lowercased display name.
fn search_name(name: &str, explicit: Option<&str>) -> String {
    explicit
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(name)
        .trim()
        .to_lowercase()
}

fn check_price(field: &str, value: Option<i64>) -> Result<(), AppError> {
    match value {
        Some(v) if v < 0 => Err(AppError::InvalidInput(format!("{field} must be >= 0"))),
        _ => Ok(()),
    }
}

fn supplied_id(id: Option<String>, prefix: &str) -> String {
    id.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| new_id(prefix))
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub id: Option<String>,
    pub name: String,
    pub name_lc: Option<String>,
    pub is_active: Option<FlagInput>,
    #[serde(alias = "short_order")]
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub name_lc: Option<String>,
    pub is_active: Option<FlagInput>,
    #[serde(alias = "short_order")]
    pub sort_order: Option<i32>,
}

impl CategoryUpdate {
    fn into_changes(self) -> Result<CategoryChanges, AppError> {
        let name = self.name.as_deref().map(|n| required(n, "name")).transpose()?;
        let name_lc = match (&name, self.name_lc.as_deref()) {
            (_, Some(lc)) if !lc.trim().is_empty() => Some(lc.trim().to_lowercase()),
            (Some(name), _) => Some(search_name(name, None)),
            _ => None,
        };
        Ok(CategoryChanges {
            name,
            name_lc,
            is_active: parse_flag(self.is_active.as_ref())?,
            sort_order: self.sort_order,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub id: Option<String>,
    pub category_id: String,
    pub name: String,
    pub name_lc: Option<String>,
    pub price_usd: i64,
    pub price_khr: i64,
    pub image_url: Option<String>,
    pub is_active: Option<FlagInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub category_id: Option<String>,
    pub name: Option<String>,
    pub name_lc: Option<String>,
    pub price_usd: Option<i64>,
    pub price_khr: Option<i64>,
    pub image_url: Option<String>,
    pub is_active: Option<FlagInput>,
}

impl ProductUpdate {
    fn into_changes(self) -> Result<ProductChanges, AppError> {
        check_price("price_usd", self.price_usd)?;
        check_price("price_khr", self.price_khr)?;
        let name = self.name.as_deref().map(|n| required(n, "name")).transpose()?;
        let name_lc = match (&name, self.name_lc.as_deref()) {
            (_, Some(lc)) if !lc.trim().is_empty() => Some(lc.trim().to_lowercase()),
            (Some(name), _) => Some(search_name(name, None)),
            _ => None,
        };
        Ok(ProductChanges {
            category_id: self.category_id,
            name,
            name_lc,
            price_usd: self.price_usd,
            price_khr: self.price_khr,
            image_url: self.image_url,
            is_active: parse_flag(self.is_active.as_ref())?,
            updated_at: Utc::now(),
        })
    }
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: DbPool,
}

impl CatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn active_categories(&self) -> Result<Vec<Category>, AppError> {
        let mut conn = self.pool.get().await?;
        Ok(categories::table
            .filter(categories::is_active.eq(true))
            .order((categories::sort_order.asc(), categories::name.asc()))
            .load::<Category>(&mut conn)
            .await?)
    }

    pub async fn create_category(&self, input: NewCategory) -> Result<Category, AppError> {
        let name = required(&input.name, "name")?;
        let category = Category {
            id: supplied_id(input.id, "CAT"),
            name_lc: search_name(&name, input.name_lc.as_deref()),
            name,
            is_active: parse_flag(input.is_active.as_ref())?.unwrap_or(true),
            sort_order: input.sort_order.unwrap_or(0),
            created_at: Utc::now(),
        };

        let mut conn = self.pool.get().await?;
        let created = diesel::insert_into(categories::table)
            .values(&category)
            .get_result::<Category>(&mut conn)
            .await?;
        info!(category_id = %created.id, "category created");
        Ok(created)
    }

    pub async fn update_category(&self, id: &str, update: CategoryUpdate) -> Result<Category, AppError> {
        let changes = update.into_changes()?;
        let mut conn = self.pool.get().await?;

        let updated = if changes == CategoryChanges::default() {
            categories::table.find(id).first::<Category>(&mut conn).await.optional()?
        } else {
            diesel::update(categories::table.find(id))
                .set(&changes)
                .get_result::<Category>(&mut conn)
                .await
                .optional()?
        };
        updated.ok_or_else(|| AppError::NotFound(format!("Category {id}")))
    }

    /// Fails with a conflict while products still reference the category.
    pub async fn delete_category(&self, id: &str) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;
        let deleted = diesel::delete(categories::table.find(id)).execute(&mut conn).await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("Category {id}")));
        }
        Ok(())
    }

    pub async fn active_products(&self, category_id: Option<&str>) -> Result<Vec<Product>, AppError> {
        let mut conn = self.pool.get().await?;
        let mut query = products::table.filter(products::is_active.eq(true)).into_boxed();
        if let Some(category_id) = category_id.map(str::trim).filter(|c| !c.is_empty()) {
            query = query.filter(products::category_id.eq(category_id.to_string()));
        }
        Ok(query
            .order(products::created_at.desc())
            .load::<Product>(&mut conn)
            .await?)
    }

    pub async fn get_product(&self, id: &str) -> Result<Product, AppError> {
        let mut conn = self.pool.get().await?;
        products::table
            .find(id)
            .first::<Product>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Product {id}")))
    }

    pub async fn create_product(&self, input: NewProduct) -> Result<Product, AppError> {
        let name = required(&input.name, "name")?;
        let category_id = required(&input.category_id, "category_id")?;
        check_price("price_usd", Some(input.price_usd))?;
        check_price("price_khr", Some(input.price_khr))?;

        let mut conn = self.pool.get().await?;
        self.ensure_category(&mut conn, &category_id).await?;

        let now = Utc::now();
        let product = Product {
            id: supplied_id(input.id, "PRD"),
            category_id,
            name_lc: search_name(&name, input.name_lc.as_deref()),
            name,
            price_usd: input.price_usd,
            price_khr: input.price_khr,
            image_url: input.image_url.filter(|u| !u.trim().is_empty()),
            is_active: parse_flag(input.is_active.as_ref())?.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };

        let created = diesel::insert_into(products::table)
            .values(&product)
            .get_result::<Product>(&mut conn)
            .await?;
        info!(product_id = %created.id, category_id = %created.category_id, "product created");
        Ok(created)
    }

    pub async fn update_product(&self, id: &str, update: ProductUpdate) -> Result<Product, AppError> {
        let changes = update.into_changes()?;
        let mut conn = self.pool.get().await?;
        if let Some(category_id) = &changes.category_id {
            self.ensure_category(&mut conn, category_id).await?;
        }

        diesel::update(products::table.find(id))
            .set(&changes)
            .get_result::<Product>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Product {id}")))
    }

    pub async fn delete_product(&self, id: &str) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;
        let deleted = diesel::delete(products::table.find(id)).execute(&mut conn).await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("Product {id}")));
        }
        Ok(())
    }

    async fn ensure_category(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        category_id: &str,
    ) -> Result<(), AppError> {
        let found = categories::table
            .find(category_id)
            .select(categories::id)
            .first::<String>(conn)
            .await
            .optional()?;
        match found {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("Category {category_id}"))),
        }
    }
}
