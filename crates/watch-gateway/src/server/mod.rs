//! Gateway server setup
//!
//! Provides the WebSocket route, the health check and node bootstrapping.

mod handler;
mod state;

pub use handler::gateway_handler;
pub use state::{GatewayParts, GatewayState, Repositories};

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use watch_cache::{RedisPool, RedisPubSub, RedisStore, SubscriberConfig};
use watch_common::{AppConfig, AppError, JwtService};
use watch_core::BasicMediaInfo;
use watch_db::{PgRoleRepository, PgRoomRepository, PgUserRepository};

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/gateway", get(gateway_handler))
        .route("/health", get(health_check))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Connect to Postgres and Redis and start a node
pub async fn create_gateway_state(config: AppConfig) -> Result<GatewayState, AppError> {
    tracing::info!("Connecting to PostgreSQL...");
    let pool = watch_db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    tracing::info!("PostgreSQL connection established");

    tracing::info!("Connecting to Redis...");
    let redis_pool = RedisPool::from_config(&config.redis).map_err(|e| AppError::Cache(e.to_string()))?;
    redis_pool.ping().await.map_err(|e| AppError::Cache(e.to_string()))?;
    let store = Arc::new(RedisStore::new(redis_pool.clone()));
    let transport = Arc::new(RedisPubSub::connect(redis_pool, SubscriberConfig::new(config.redis.pubsub_buffer)));
    tracing::info!("Redis connection established");

    let verifier = Arc::new(JwtService::from_config(&config.jwt)?);

    let repositories = Repositories {
        users: Arc::new(PgUserRepository::new(pool.clone())),
        rooms: Arc::new(PgRoomRepository::new(pool.clone())),
        roles: Arc::new(PgRoleRepository::new(pool)),
    };

    let parts = GatewayParts {
        node_id: config.node.id,
        store,
        transport,
        repositories,
        verifier,
        media: Arc::new(BasicMediaInfo),
        session: config.session,
        cors: config.cors,
        workers: config.workers,
    };

    GatewayState::start(parts)
        .await
        .map_err(|e| AppError::Cache(format!("Failed to start gateway node: {e}")))
}

/// Run the gateway server until ctrl-c
pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), AppError> {
    tracing::info!("Starting Gateway server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Gateway listening on ws://{}/gateway", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Config(format!("Server error: {e}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr: SocketAddr = config
        .gateway
        .address()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid gateway address: {e}")))?;

    let state = create_gateway_state(config).await?;
    tracing::info!(node_id = %state.node_id(), "Gateway node started");

    let app = create_app(state.clone());
    let result = run_server(app, addr).await;

    state.shutdown();
    result
}
