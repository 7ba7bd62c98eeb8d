use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use super::extract::ApiJson;
use super::AppState;
use crate::auth::{self, Staff};
use crate::error::AppError;
use crate::models::AdminUser;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

async fn login(State(state): State<AppState>, ApiJson(request): ApiJson<LoginRequest>) -> Result<Json<TokenResponse>, AppError> {
    let mut conn = state.pool.get().await?;
    let user = auth::authenticate(&mut conn, &request.username, &request.password).await?;
    let access_token = state.keys.issue(&user.username, &user.role)?;
    tracing::info!(username = %user.username, "admin logged in");
    Ok(Json(TokenResponse { access_token, token_type: "bearer" }))
}

async fn me(staff: Staff, State(state): State<AppState>) -> Result<Json<AdminUser>, AppError> {
    let mut conn = state.pool.get().await?;
    Ok(Json(auth::find_active_user(&mut conn, &staff.username).await?))
}
