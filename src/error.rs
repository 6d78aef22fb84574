use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::Collection;

/// Internal errors. Only `BadRequest` is ever shown to a client verbatim;
/// everything else is logged and collapsed.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transaction on {collection}/{key} lost too many write races")]
    Contention { collection: Collection, key: String },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Json(e) => {
                tracing::warn!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", None)
            }
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream error", None)
            }
            other => {
                tracing::error!("{}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// User-facing outcome of a licensing operation.
///
/// These are the only failure kinds that cross the trust boundary. Malformed
/// input and missing records share one message so a caller cannot tell which
/// check failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseError {
    #[error("invalid input")]
    InvalidInput,
    #[error("not found")]
    NotFound,
    #[error("machine limit reached")]
    MachineLimitReached,
    #[error("trial expired")]
    Expired,
    #[error("invalid payment")]
    PaymentInvalid,
    #[error("payment unsuccessful")]
    PaymentUnsuccessful,
    #[error("unknown error")]
    Unknown,
}

impl LicenseError {
    /// The string placed in a reply's `error` field.
    pub fn message(&self) -> &'static str {
        match self {
            LicenseError::InvalidInput | LicenseError::NotFound => "license not found",
            LicenseError::MachineLimitReached => "machine limit reached",
            LicenseError::Expired => "trial expired",
            LicenseError::PaymentInvalid => "invalid payment",
            LicenseError::PaymentUnsuccessful => "payment unsuccessful",
            LicenseError::Unknown => "unknown error",
        }
    }
}

impl From<AppError> for LicenseError {
    fn from(err: AppError) -> Self {
        tracing::error!(error = %err, "Licensing operation failed");
        LicenseError::Unknown
    }
}

impl From<crate::identity::InvalidFormat> for LicenseError {
    fn from(err: crate::identity::InvalidFormat) -> Self {
        tracing::debug!(field = err.field, "Rejected malformed input");
        LicenseError::InvalidInput
    }
}
