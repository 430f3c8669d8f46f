use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Fragments of database error messages that mean "another transaction holds
/// the row, try again". Covers PostgreSQL lock timeouts, deadlocks and
/// serialization failures, plus SQLite's busy error.
const RETRYABLE_DB_MARKERS: &[&str] = &[
    "lock timeout",
    "could not obtain lock",
    "deadlock detected",
    "could not serialize access",
    "database is locked",
    "55p03",
    "40001",
    "40p01",
];

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "code": "insufficient_stock",
    "message": "Insufficient stock: Blue T-Shirt (M)",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Stable machine-readable error kind
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// Why a coupon code was refused. Variants are listed in the order the
/// validator checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum CouponRejection {
    #[error("coupon code is not valid")]
    InvalidCode,
    #[error("coupon is not active yet")]
    NotYetActive,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit has been reached")]
    GlobalLimitReached,
    #[error("coupon has already been used the maximum number of times by this user")]
    PerUserLimitReached,
    #[error("order subtotal is below the coupon minimum of {minimum}")]
    BelowMinimumAmount { minimum: Decimal },
    #[error("coupon does not apply to any product in the cart")]
    ProductNotEligible,
    #[error("coupon does not apply to any category in the cart")]
    CategoryNotEligible,
    #[error("coupon is not available to this user")]
    UserNotEligible,
}

impl CouponRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCode => "coupon_invalid_code",
            Self::NotYetActive => "coupon_not_yet_active",
            Self::Expired => "coupon_expired",
            Self::GlobalLimitReached => "coupon_global_limit_reached",
            Self::PerUserLimitReached => "coupon_per_user_limit_reached",
            Self::BelowMinimumAmount { .. } => "coupon_below_minimum_amount",
            Self::ProductNotEligible => "coupon_product_not_eligible",
            Self::CategoryNotEligible => "coupon_category_not_eligible",
            Self::UserNotEligible => "coupon_user_not_eligible",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invalid coupon: {0}")]
    InvalidCoupon(CouponRejection),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        if is_retryable_db_error(&err) {
            ServiceError::Conflict(format!("concurrent update, retry the request ({err})"))
        } else {
            ServiceError::DatabaseError(err)
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<CouponRejection> for ServiceError {
    fn from(reason: CouponRejection) -> Self {
        ServiceError::InvalidCoupon(reason)
    }
}

/// True when the database refused the statement because of lock contention.
pub fn is_retryable_db_error(err: &DbErr) -> bool {
    let message = err.to_string().to_ascii_lowercase();
    RETRYABLE_DB_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) | Self::OrderNotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::EmptyCart | Self::InvalidCoupon(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::InvalidTransition(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Stable error kind exposed to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => "internal_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::EmptyCart => "empty_cart",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::InvalidCoupon(reason) => reason.code(),
            Self::OrderNotFound(_) => "order_not_found",
            Self::AccessDenied(_) => "access_denied",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized(_) => "unauthorized",
        }
    }

    /// Whether the whole operation may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            Self::Conflict(_) => {
                "Conflict: the request raced another update, please retry".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        ApiError::ServiceError(self).into_response()
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::ServiceError(service_error) => {
                if service_error.status_code().is_server_error() {
                    error!(error = %service_error, "Request failed with internal error");
                }
                (
                    service_error.status_code(),
                    service_error.code(),
                    service_error.response_message(),
                )
            }
            ApiError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "access_denied", msg.clone()),
        };

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: code.to_string(),
            message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
