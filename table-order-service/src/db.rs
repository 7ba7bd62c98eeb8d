use anyhow::Result;
use diesel::{Connection, PgConnection};
use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager};
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<AsyncPgConnection>;

/// Runs on a blocking connection; call before the pool is handed out.
pub fn run_migrations(database_url: &str) -> Result<()> {
    info!("Running database migrations...");
    let mut conn = PgConnection::establish(database_url)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    info!(count = applied.len(), "Migrations completed successfully");
    Ok(())
}

pub async fn connect(database_url: &str, max_size: u32) -> Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Ok(Pool::builder().max_size(max_size).build(manager).await?)
}

/// A pool that never opens a connection until asked; lets router and relay
/// tests run without Postgres.
#[cfg(test)]
pub(crate) fn lazy_pool() -> DbPool {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new("postgres://nobody@127.0.0.1:1/none");
    Pool::builder()
        .connection_timeout(std::time::Duration::from_millis(200))
        .build_unchecked(manager)
}

/// Pool against `TEST_DATABASE_URL` with migrations applied. Tests using it
/// are `#[ignore]`d and run with `cargo test -- --ignored`.
#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set for ignored tests");
    let migrate_url = url.clone();
    tokio::task::spawn_blocking(move || run_migrations(&migrate_url))
        .await
        .unwrap()
        .unwrap();
    connect(&url, 16).await.unwrap()
}
