//! CivicNotify API server binary entrypoint.

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use civic_common::config::{AppConfig, ThrottleBackend};
use civic_common::db::{create_pool, run_migrations};
use civic_common::redis_pool::create_redis_pool;
use civic_dispatch::service::NotificationService;

use civic_api::routes::create_router;
use civic_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "civic_api=debug,civic_dispatch=debug,civic_notifier=debug,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting CivicNotify API server...");

    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    // Redis is only needed for the shared throttle
    let redis = match config.dispatch_throttle {
        ThrottleBackend::Redis => Some(create_redis_pool(&config.redis_url).await?),
        ThrottleBackend::Memory => None,
    };

    let notifications = NotificationService::postgres(pool, redis, &config)?;
    tracing::info!(
        throttle = ?config.dispatch_throttle,
        interval_ms = config.dispatch_send_interval_ms,
        concurrency = config.dispatch_concurrency,
        batch_ceiling = config.dispatch_batch_ceiling,
        "Notification dispatcher ready"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let state = AppState::new(config, notifications);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
