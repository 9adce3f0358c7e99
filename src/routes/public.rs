use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: monitoring, the role catalog, staff
/// self-registration and the M-Pesa result callback.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /roles
        // The staff role catalog (code, label, category).
        .route("/roles", get(handlers::list_roles))
        // POST /register/staff
        // Creates the account at the identity provider, then mirrors it locally.
        .route("/register/staff", post(handlers::register_staff))
        // POST /payments/mpesa/callback
        // Payment results posted by M-Pesa. Matched to a payment by checkout request id.
        .route("/payments/mpesa/callback", post(handlers::mpesa_callback))
}
