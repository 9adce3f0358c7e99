use campuscare_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    payments::{DisabledGateway, MpesaClient, PaymentGatewayState},
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the database and the HTTP server, in that order.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets).
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging. RUST_LOG wins over the defaults below.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campuscare_portal=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);
    tracing::info!(
        "Breakfast lock at {} (UTC{})",
        config.meal_lock_time,
        config.campus_offset
    );

    // 3. Database: pool and schema migrations.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. Payment gateway.
    let payments = match &config.mpesa {
        Some(mpesa) => {
            tracing::info!("M-Pesa payments enabled against {}", mpesa.base_url);
            Arc::new(MpesaClient::new(mpesa.clone(), config.campus_offset)) as PaymentGatewayState
        }
        None => {
            tracing::warn!("MPESA_CONSUMER_KEY not set; payments are disabled");
            Arc::new(DisabledGateway) as PaymentGatewayState
        }
    };

    // 5. Unified state and router.
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState {
        repo,
        payments,
        config,
    });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
