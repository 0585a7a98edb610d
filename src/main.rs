mod config;
mod errors;
mod handlers;
mod models;
mod query;
mod services;

use axum::{routing::get, Router};
use mongodb::Client;
use tower_http::trace::TraceLayer;

use crate::{config::Config, services::Store};

#[tokio::main]
async fn main() {
    // Initialize basic tracing subscriber
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::load().expect("Failed to load configuration");
    let config_state = config.clone();

    // Initialize MongoDB client and store wrapper
    let client = Client::with_uri_str(&config.database.uri)
        .await
        .expect("Failed to connect to MongoDB");
    let store = Store::new(client, &config.database.name);

    // Unique email index; the server still starts if the store is not yet
    // reachable, the first request will surface the failure.
    if let Err(err) = store.ensure_indexes().await {
        tracing::warn!("could not ensure indexes: {}", err);
    }

    // Create router with all routes
    let app = Router::new()
        // Task routes
        .route(
            "/api/tasks",
            get(handlers::list_tasks).post(handlers::create_task),
        )
        .route(
            "/api/tasks/:id",
            get(handlers::get_task)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        // User routes
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/api/users/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        // Request logging
        .layer(TraceLayer::new_for_http())
        // Add state
        .with_state((store, config_state));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.server.host, config.server.port
    ))
    .await
    .expect("Failed to bind server");
    tracing::info!("listening on {}:{}", config.server.host, config.server.port);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("Failed to start server");
}
