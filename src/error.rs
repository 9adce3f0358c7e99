use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

use crate::roles::UnknownRole;

/// The path of the host's sign-in page. Unauthenticated callers are sent here with the
/// original path in `next`.
pub const SIGN_IN_PATH: &str = "/login";

/// The fixed text shown to authenticated callers who fail every permission check.
pub const ACCESS_DENIED_MESSAGE: &str =
    "Access Denied — this feature is restricted to specific departments";

/// AccessError
///
/// The two outcomes of a guard that stop a request before it reaches the handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// No valid session. Resolved by redirecting to sign-in, not reported as a failure.
    #[error("authentication required")]
    Unauthenticated { next: String },
    #[error("{}", ACCESS_DENIED_MESSAGE)]
    AccessDenied,
}

impl AccessError {
    pub fn unauthenticated(next: impl Into<String>) -> Self {
        AccessError::Unauthenticated { next: next.into() }
    }
}

/// sign_in_location
///
/// Builds the redirect target for an unauthenticated request, carrying the original
/// path and query so the sign-in page can send the user back.
pub fn sign_in_location(next: &str) -> String {
    format!("{}?next={}", SIGN_IN_PATH, urlencoding::encode(next))
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        match self {
            AccessError::Unauthenticated { next } => {
                Redirect::to(&sign_in_location(&next)).into_response()
            }
            AccessError::AccessDenied => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": ACCESS_DENIED_MESSAGE })),
            )
                .into_response(),
        }
    }
}

/// ApiError
///
/// Every failure a handler can return. Each variant maps to one status code; internal
/// details (database, upstream) are logged and replaced by a generic message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("This page is only accessible to students.")]
    NotAStudent,
    #[error("You are marked as away for this date. Change your 'Away Mode' settings first.")]
    MarkedAway,
    #[error("Meals cannot be changed for a date that has already passed.")]
    PastDate,
    #[error("End date must be after start date.")]
    InvalidAwayRange,
    #[error("Away periods cannot be longer than {} days.", crate::meals::MAX_AWAY_DAYS)]
    AwayRangeTooLong,
    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),
    #[error("The identity provider rejected the registration.")]
    RegistrationRejected,
    #[error("The identity provider is not configured.")]
    ProviderUnavailable,
    #[error("Amount must be a positive whole number of shillings.")]
    InvalidAmount,
    #[error("Enter a valid Safaricom number, e.g. 0712345678.")]
    InvalidPhone,
    #[error("Payment not found.")]
    PaymentNotFound,
    #[error("Cannot verify this payment (no checkout request).")]
    PaymentNotVerifiable,
    #[error("Callback carries no CheckoutRequestID.")]
    InvalidCallback,
    #[error("Payments are not configured.")]
    PaymentsUnavailable,
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("upstream request failed")]
    Upstream(#[from] reqwest::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Access(AccessError::Unauthenticated { .. }) => StatusCode::SEE_OTHER,
            ApiError::Access(AccessError::AccessDenied) | ApiError::NotAStudent => {
                StatusCode::FORBIDDEN
            }
            ApiError::MarkedAway => StatusCode::CONFLICT,
            ApiError::PastDate
            | ApiError::InvalidAwayRange
            | ApiError::AwayRangeTooLong
            | ApiError::UnknownRole(_)
            | ApiError::RegistrationRejected
            | ApiError::InvalidAmount
            | ApiError::InvalidPhone
            | ApiError::InvalidCallback => StatusCode::BAD_REQUEST,
            ApiError::PaymentNotFound => StatusCode::NOT_FOUND,
            ApiError::PaymentNotVerifiable => StatusCode::CONFLICT,
            ApiError::ProviderUnavailable | ApiError::PaymentsUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Access(access) => access.into_response(),
            ApiError::Database(ref e) => {
                tracing::error!("database error: {:?}", e);
                (self.status(), Json(json!({ "error": "Internal server error" }))).into_response()
            }
            ApiError::Upstream(ref e) => {
                tracing::error!("upstream error: {:?}", e);
                (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
            }
            other => (other.status(), Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}
