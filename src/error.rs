// src/error.rs
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Not found")]
    NotFound,

    #[error("Duplicate record")]
    Duplicate,

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for BillingError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        // Internal detail stays in the logs, never in the response body.
        HttpResponse::build(status_code).json(json!({
            "error": self.error_code(),
            "message": self.public_message(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            BillingError::NotFound => StatusCode::NOT_FOUND,
            BillingError::Duplicate => StatusCode::CONFLICT,
            BillingError::InsufficientBalance { .. } => StatusCode::FORBIDDEN,
            BillingError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl BillingError {
    fn error_code(&self) -> &str {
        match self {
            BillingError::Database(_) => "database_error",
            BillingError::Pool(_) => "database_error",
            BillingError::Redis(_) => "cache_error",
            BillingError::Cache(_) => "cache_error",
            BillingError::NotFound => "not_found",
            BillingError::Duplicate => "duplicate",
            BillingError::InsufficientBalance { .. } => "insufficient_balance",
            BillingError::Validation(_) => "invalid_request",
            BillingError::Serialization(_) => "invalid_request",
            BillingError::Internal(_) => "internal_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            BillingError::NotFound
            | BillingError::Duplicate
            | BillingError::InsufficientBalance { .. }
            | BillingError::Validation(_) => self.to_string(),
            _ => "internal error".to_string(),
        }
    }
}
