use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{parse_flag, FlagInput};
use crate::db::DbPool;
use crate::engine::new_id;
use crate::error::AppError;
use crate::models::{DiningTable, TableChanges};
use crate::schema::dining_tables;

/// `https://t.me/<bot>?start=<code>`; the bot receives the code as the
/// `/start` payload.
pub fn deep_link(bot_username: &str, code: &str) -> String {
    format!("https://t.me/{bot_username}?start={code}")
}

#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    pub id: String,
    pub code: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub deep_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTable {
    pub id: Option<String>,
    pub code: String,
    pub name: Option<String>,
    pub is_active: Option<FlagInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableUpdate {
    pub code: Option<String>,
    pub name: Option<String>,
    pub is_active: Option<FlagInput>,
}

fn clean_code(code: &str) -> Result<String, AppError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AppError::InvalidInput("code is required".to_string()));
    }
    Ok(code.to_string())
}

#[derive(Clone)]
pub struct TableRegistry {
    pool: DbPool,
    bot_username: Option<String>,
}

impl TableRegistry {
    pub fn new(pool: DbPool, bot_username: Option<String>) -> Self {
        Self { pool, bot_username }
    }

    pub fn view(&self, table: DiningTable) -> TableView {
        let deep_link = self.bot_username.as_deref().map(|bot| deep_link(bot, &table.code));
        TableView {
            id: table.id,
            code: table.code,
            name: table.name,
            is_active: table.is_active,
            created_at: table.created_at,
            deep_link,
        }
    }

    /// Customer-facing lookup: unknown codes are 404, inactive tables 403.
    pub async fn by_code(&self, code: &str) -> Result<TableView, AppError> {
        let mut conn = self.pool.get().await?;
        let table = dining_tables::table
            .filter(dining_tables::code.eq(code.trim()))
            .first::<DiningTable>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| AppError::NotFound("Table".to_string()))?;
        if !table.is_active {
            return Err(AppError::Unavailable("Table is inactive".to_string()));
        }
        Ok(self.view(table))
    }

    pub async fn get(&self, id: &str) -> Result<TableView, AppError> {
        let mut conn = self.pool.get().await?;
        let table = dining_tables::table
            .find(id)
            .first::<DiningTable>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Table {id}")))?;
        Ok(self.view(table))
    }

    pub async fn create(&self, input: NewTable) -> Result<TableView, AppError> {
        let code = clean_code(&input.code)?;
        let table = DiningTable {
            id: input
                .id
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| new_id("TBL")),
            name: input
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| code.clone()),
            code,
            is_active: parse_flag(input.is_active.as_ref())?.unwrap_or(true),
            created_at: Utc::now(),
        };

        let mut conn = self.pool.get().await?;
        let created = diesel::insert_into(dining_tables::table)
            .values(&table)
            .get_result::<DiningTable>(&mut conn)
            .await?;
        info!(table_id = %created.id, code = %created.code, "table created");
        Ok(self.view(created))
    }

    pub async fn update(&self, id: &str, update: TableUpdate) -> Result<TableView, AppError> {
        let changes = TableChanges {
            code: update.code.as_deref().map(clean_code).transpose()?,
            name: update.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            is_active: parse_flag(update.is_active.as_ref())?,
        };

        let mut conn = self.pool.get().await?;
        let updated = if changes == TableChanges::default() {
            dining_tables::table.find(id).first::<DiningTable>(&mut conn).await.optional()?
        } else {
            diesel::update(dining_tables::table.find(id))
                .set(&changes)
                .get_result::<DiningTable>(&mut conn)
                .await
                .optional()?
        };
        updated
            .map(|t| self.view(t))
            .ok_or_else(|| AppError::NotFound(format!("Table {id}")))
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;
        let deleted = diesel::delete(dining_tables::table.find(id)).execute(&mut conn).await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("Table {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::lazy_pool;

    fn table(code: &str) -> DiningTable {
        DiningTable {
            id: "TBL_1".into(),
            code: code.into(),
            name: "Window".into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn deep_link_carries_the_code_as_start_payload() {
        assert_eq!(deep_link("table_order_bot", "TB001"), "https://t.me/table_order_bot?start=TB001");
    }

    #[tokio::test]
    async fn views_carry_deep_link_only_when_bot_is_known() {
        let with_bot = TableRegistry::new(lazy_pool(), Some("table_order_bot".into()));
        let view = with_bot.view(table("TB002"));
        assert_eq!(view.deep_link.as_deref(), Some("https://t.me/table_order_bot?start=TB002"));

        let without_bot = TableRegistry::new(lazy_pool(), None);
        assert_eq!(without_bot.view(table("TB002")).deep_link, None);
    }

    #[test]
    fn blank_codes_are_rejected() {
        assert!(matches!(clean_code("  "), Err(AppError::InvalidInput(_))));
        assert_eq!(clean_code(" TB001 ").unwrap(), "TB001");
    }
}
