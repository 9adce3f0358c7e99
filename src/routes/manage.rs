use crate::{AppState, guard::guarded, handlers, policy};
use axum::{Router, routing::get};

/// Manage Router Module
///
/// Staff-only routes, nested under `/manage`. Each group sits behind its own ViewGuard:
/// anonymous callers are redirected to sign-in, authenticated callers failing the group's
/// requirement get 403 "Access Denied".
pub fn manage_routes(state: &AppState) -> Router<AppState> {
    let meal_reports = Router::new()
        // GET /manage/dashboard
        // Meal head-counts for today and tomorrow.
        .route("/dashboard", get(handlers::get_kitchen_dashboard))
        // GET /manage/meals?date=
        .route("/meals", get(handlers::get_meal_counts));

    let away_list = Router::new()
        // GET /manage/away?date=
        .route("/away", get(handlers::get_away_list));

    let audit_logs = Router::new()
        // GET /manage/audit-logs?limit=
        .route("/audit-logs", get(handlers::get_audit_logs));

    let oversight = Router::new()
        // GET /manage/overview
        .route("/overview", get(handlers::get_staff_overview));

    let payments = Router::new()
        // GET /manage/payments?status=&q=&limit=
        .route("/payments", get(handlers::get_payments));

    Router::new()
        .merge(guarded(meal_reports, state, policy::MEAL_REPORTS))
        .merge(guarded(away_list, state, policy::AWAY_LIST))
        .merge(guarded(audit_logs, state, policy::AUDIT_LOGS))
        .merge(guarded(oversight, state, policy::STAFF_OVERSIGHT))
        .merge(guarded(payments, state, policy::PAYMENTS))
}
