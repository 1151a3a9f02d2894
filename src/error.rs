use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(ref message) => {
                // Client mistakes are not server errors
                tracing::debug!("Rejected request input: {}", message);
                (StatusCode::BAD_REQUEST, "Invalid input")
            }
            ApiError::PayloadTooLarge(ref message) => {
                tracing::debug!("Rejected oversized request body: {}", message);
                (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
            }
            ApiError::Query(ref err) => {
                tracing::error!("Database query failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            ApiError::Configuration(ref err) => {
                tracing::error!("Database configuration error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            ApiError::Internal(ref err) => {
                tracing::error!("Internal server error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

// PostgreSQL error mapping
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.code() {
            Some(code) => ApiError::Query(format!("{} (code: {})", err, code.code())),
            None if err.is_closed() => ApiError::Query(format!("connection closed: {}", err)),
            None => ApiError::Query(err.to_string()),
        }
    }
}

// Connection pool error mapping
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                tracing::warn!("Database connection pool timeout: {}", err);
                ApiError::Query(format!("connection pool timeout: {}", err))
            }
            deadpool_postgres::PoolError::Closed => {
                ApiError::Query("connection pool is closed".to_string())
            }
            deadpool_postgres::PoolError::NoRuntimeSpecified => {
                ApiError::Configuration(err.to_string())
            }
            _ => ApiError::Query(format!("connection pool error: {}", err)),
        }
    }
}

// Result type alias for convenience
pub type ApiResult<T> = Result<T, ApiError>;
