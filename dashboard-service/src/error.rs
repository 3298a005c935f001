use std::fmt::Display;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    ExternalService {
        message: String,
        /// Only populated outside production.
        details: Option<serde_json::Value>,
    },

    #[error("failed to {context}: {cause}")]
    Storage { context: String, cause: String },

    #[error("{sync_type} already ran recently, next allowed at {next_eligible_at}")]
    RateLimited {
        sync_type: String,
        next_eligible_at: DateTime<Utc>,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn storage(context: &str, cause: impl Display) -> Self {
        let cause = cause.to_string();
        error!(context, %cause, "storage error");
        ApiError::Storage {
            context: context.to_string(),
            cause,
        }
    }

    /// Unique violations are the caller's fault; everything else is a storage error.
    pub fn from_write(context: &str, err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                ApiError::Validation(format!("{context}: duplicate value ({})", info.message()))
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                ApiError::Validation(format!("{context}: unknown reference ({})", info.message()))
            }
            other => ApiError::storage(context, other),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::ExternalService { .. } => "external_service_error",
            ApiError::Storage { .. } => "storage_error",
            ApiError::RateLimited { .. } => "rate_limited",
        }
    }
}

pub trait StorageResultExt<T> {
    fn storage(self, context: &str) -> Result<T, ApiError>;
}

impl<T, E: Display> StorageResultExt<T> for Result<T, E> {
    fn storage(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::storage(context, e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "success": false,
            "error": self.kind(),
        });

        match &self {
            ApiError::Storage { context, cause } => {
                body["message"] = format!("Failed to {context}").into();
                body["cause"] = cause.clone().into();
            }
            ApiError::ExternalService { message, details } => {
                body["message"] = message.clone().into();
                if let Some(details) = details {
                    body["details"] = details.clone();
                }
            }
            ApiError::RateLimited {
                next_eligible_at, ..
            } => {
                body["message"] = self.to_string().into();
                body["next_eligible_at"] = next_eligible_at.to_rfc3339().into();
            }
            _ => {
                body["message"] = self.to_string().into();
            }
        }

        (self.status(), Json(body)).into_response()
    }
}
