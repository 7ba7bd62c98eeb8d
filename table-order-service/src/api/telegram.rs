use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use shared::telegram::Update;
use tracing::warn;

use super::AppState;
use crate::auth::AdminOnly;
use crate::error::AppError;

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/telegram/webhook", post(webhook))
        .route("/telegram/webhook/set", post(set_webhook))
        .route("/telegram/webhook/info", get(webhook_info))
        .route("/telegram/webhook/delete", post(delete_webhook))
}

/// Bodies that do not parse are treated as an empty update so Telegram
/// stops redelivering them.
async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>, AppError> {
    if let Some(expected) = state.telegram_config.webhook_secret() {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected) {
            warn!("telegram webhook called with a bad secret token");
            return Err(AppError::Forbidden("Invalid Telegram secret token".to_string()));
        }
    }

    let update = serde_json::from_slice::<Update>(&body).unwrap_or_else(|e| {
        warn!(error = %e, "ignoring unparseable telegram update");
        Update::default()
    });
    state.relay.handle_update(update).await;

    Ok(Json(json!({ "ok": true })))
}

async fn set_webhook(_admin: AdminOnly, State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let url = state
        .telegram_config
        .resolved_webhook_url()
        .ok_or_else(|| AppError::InvalidInput("Missing TELEGRAM_WEBHOOK_URL or APP_BASE_URL".to_string()))?;
    let result = state
        .telegram
        .set_webhook(&url, state.telegram_config.webhook_secret())
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;
    tracing::info!(url = %url, "telegram webhook configured");
    Ok(Json(result))
}

async fn webhook_info(_admin: AdminOnly, State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let info = state
        .telegram
        .webhook_info()
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;
    Ok(Json(info))
}

async fn delete_webhook(_admin: AdminOnly, State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let result = state
        .telegram
        .delete_webhook()
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;
    Ok(Json(result))
}
