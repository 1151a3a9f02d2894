use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info};

use word_game_api::{
    config::Config,
    db::Database,
    middleware::init_tracing,
    rate_limit::RateLimiter,
    server::{create_router, serve, shutdown_signal},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Build the connection pool once; handlers share it
    let database = match Database::new(config.database.clone()).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    let limiter = RateLimiter::new(config.rate_limit.clone());
    limiter.spawn_pruner();
    info!(
        "Rate limiting to {} requests per {}s per client",
        config.rate_limit.max_requests,
        config.rate_limit.window.as_secs()
    );

    let app = create_router(database.clone(), limiter, config.trusted_proxy_hops);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server is running on port {}", config.port);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            database.close_pool();
            std::process::exit(1);
        }
    };

    // Stop accepting, drain in-flight requests, then close the pool
    if let Err(e) = serve(listener, app, database, shutdown_signal()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}
