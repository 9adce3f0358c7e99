use axum::{
    extract::{FromRef, Request},
    http::HeaderName,
    Router,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access policy: role catalog, evaluator, named requirements and the guard.
pub mod roles;
pub mod access;
pub mod policy;
pub mod guard;

// Business rules.
pub mod meals;
pub mod payments;

// Core application services and components.
pub mod auth;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod config;

// Route groups (Public, Student, Manage).
pub mod routes;
use routes::{manage, public, student};
use auth::AuthUser;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use payments::PaymentGatewayState;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Aggregates every documented path and schema into the OpenAPI document served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_roles, handlers::register_staff, handlers::get_access_summary,
        handlers::get_my_meals, handlers::confirm_meals, handlers::set_away_mode,
        handlers::get_kitchen_dashboard, handlers::get_meal_counts, handlers::get_away_list,
        handlers::get_audit_logs, handlers::get_staff_overview,
        handlers::initiate_payment, handlers::list_my_payments, handlers::verify_payment,
        handlers::mpesa_callback, handlers::get_payments
    ),
    components(
        schemas(
            roles::Category, meals::MealSelection,
            models::Student, models::Meal, models::AwayPeriod, models::AuditLogEntry,
            models::MealConfirmationRequest, models::AwayPeriodRequest, models::RegisterStaffRequest,
            models::MealConfirmationResponse, models::AwayModeResponse, models::MealCounts,
            models::DailyMealCounts, models::KitchenDashboard, models::AwayEntry,
            models::CategoryCount, models::StaffOverview, models::RoleEntry,
            models::StaffAccount, models::AccessSummary,
            payments::PaymentStatus, models::Payment, models::PaymentRecord,
            models::PaymentRequest, models::PaymentResponse,
            payments::StkCallbackEnvelope, payments::StkCallbackBody, payments::StkCallback,
            payments::CallbackMetadata, payments::CallbackItem,
        )
    ),
    tags(
        (name = "campuscare", description = "CampusCare hostel & student welfare portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container of shared services, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: database access behind the `Repository` trait.
    pub repo: RepositoryState,
    /// Payment Gateway: M-Pesa STK push behind the `PaymentGateway` trait.
    pub payments: PaymentGatewayState,
    /// Configuration: loaded once at startup.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors (identity resolution in particular) pull single components from AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Requires a signed-in caller for the student routes. Extracting `AuthUser` redirects
/// anonymous callers to sign-in before the handler runs.
async fn auth_middleware(
    _auth_user: AuthUser,
    request: Request,
    next: Next,
) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no middleware.
        .merge(public::public_routes())
        // Student Routes: sign-in required.
        .merge(
            student::student_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware
                ))
        )
        // Manage Routes: each group carries its own ViewGuard.
        .nest("/manage", manage::manage_routes(&state))
        .with_state(state);

    // Observability and correlation layers, outermost.
    base_router
        .layer(
             ServiceBuilder::new()
                 .layer(SetRequestIdLayer::new(
                     x_request_id.clone(),
                     MakeRequestUuid,
                 ))
                 .layer(
                     TraceLayer::new_for_http()
                         .make_span_with(trace_span_logger)
                         .on_response(
                             DefaultOnResponse::new()
                                 .level(Level::INFO)
                                 .latency_unit(tower_http::LatencyUnit::Millis)
                         )
                 )
                 .layer(PropagateRequestIdLayer::new(x_request_id))
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request tracing span: method, uri and the `x-request-id` set above, so
/// every log line of a request is correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
