use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::PoolError;
use serde::Serialize;
use shared::{OrderAction, OrderStatus, TransitionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("product not found or inactive: {}", .0.join(", "))]
    ProductsUnavailable(Vec<String>),

    #[error("order is {current}, cannot {action}")]
    InvalidTransition { current: OrderStatus, action: OrderAction },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("upstream call failed: {0}")]
    Upstream(String),

    #[error("database error: {0}")]
    Database(DieselError),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl AppError {
    pub fn invalid_quantity() -> Self {
        AppError::InvalidInput("qty must be > 0".to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Unavailable(_) | AppError::ProductsUnavailable(_) => "UNAVAILABLE",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Upstream(_) => "UPSTREAM_FAILURE",
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::ProductsUnavailable(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unavailable(_) | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        AppError::InvalidTransition { current: e.current, action: e.action }
    }
}

impl From<DieselError> for AppError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => AppError::NotFound("record".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                tracing::warn!(constraint = info.constraint_name().unwrap_or("?"), detail = info.message(), "unique violation");
                AppError::Conflict("record already exists".to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                tracing::warn!(constraint = info.constraint_name().unwrap_or("?"), detail = info.message(), "foreign key violation");
                AppError::Conflict("record is still referenced".to_string())
            }
            other => AppError::Database(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<bb8::RunError<PoolError>> for AppError {
    fn from(e: bb8::RunError<PoolError>) -> Self {
        AppError::Pool(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse { error: self.to_string(), code: self.code() };
        (status, Json(body)).into_response()
    }
}
