use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Student Router Module
///
/// Routes for any signed-in account. The `auth_middleware` layer in `create_router`
/// redirects anonymous callers; handlers that need a student profile check for it.
pub fn student_routes() -> Router<AppState> {
    Router::new()
        // GET /me/access
        // Role, category, groups and the staff operations the caller can reach.
        .route("/me/access", get(handlers::get_access_summary))
        // GET /me/meals
        // Meal records from today onwards.
        .route("/me/meals", get(handlers::get_my_meals))
        // POST /meals/confirm
        // Daily meal confirmation, subject to the breakfast time-lock.
        .route("/meals/confirm", post(handlers::confirm_meals))
        // POST /meals/away
        // Away mode: records the period and clears meals across it.
        .route("/meals/away", post(handlers::set_away_mode))
        // GET /payments, POST /payments
        // Payment history; a new payment sends the M-Pesa prompt to the student's phone.
        .route(
            "/payments",
            get(handlers::list_my_payments).post(handlers::initiate_payment),
        )
        // POST /payments/{id}/verify
        // Queries the provider when the callback never arrived.
        .route("/payments/{id}/verify", post(handlers::verify_payment))
}
