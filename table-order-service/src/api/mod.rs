mod admin;
mod auth;
mod extract;
mod public;
mod telegram;

use axum::{extract::FromRef, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::JwtKeys;
use crate::catalog::CatalogStore;
use crate::config::TelegramConfig;
use crate::customers::CustomerDirectory;
use crate::db::DbPool;
use crate::orders::OrderEngine;
use crate::relay::NotificationRelay;
use crate::tables::TableRegistry;
use crate::telegram::TelegramClient;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orders: OrderEngine,
    pub catalog: CatalogStore,
    pub tables: TableRegistry,
    pub customers: CustomerDirectory,
    pub relay: NotificationRelay,
    pub telegram: TelegramClient,
    pub telegram_config: Arc<TelegramConfig>,
    pub keys: JwtKeys,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(public::routes())
        .merge(auth::routes())
        .merge(admin::routes())
        .merge(telegram::routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}
