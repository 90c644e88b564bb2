use axum::{
    Router,
    routing::{delete, get, patch},
};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::env;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketwatch_backend::{AppState, handlers};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,marketwatch_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Connect to database
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    tracing::info!("Connecting to database...");
    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let state = AppState::new(db);

    // Build router
    let app = Router::new()
        .route("/", get(health))
        .route("/api/fraud/alerts", get(handlers::fraud::get_alerts))
        .route("/api/fraud/read/{id}", patch(handlers::fraud::mark_read))
        .route("/api/fraud/read-all", patch(handlers::fraud::mark_all_read))
        .route(
            "/api/fraud/unread-all",
            patch(handlers::fraud::mark_all_unread),
        )
        .route(
            "/api/fraud/listing/{listing_id}",
            delete(handlers::fraud::delete_alerts_for_listing),
        )
        .route(
            "/api/fraud/ws",
            get(handlers::fraud_ws::fraud_alerts_websocket),
        )
        .route(
            "/api/listings/{id}/price",
            patch(handlers::listing_price::update_listing_price),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listener");

    tracing::info!("Server listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}

async fn health() -> &'static str {
    "marketwatch-backend up"
}
