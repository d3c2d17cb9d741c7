pub mod config;
pub mod database;
pub mod redis_client;
pub mod error;
pub mod models;
pub mod controllers;
pub mod middleware;
pub mod cache;
pub mod services;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use services::{
    auth::TokenService,
    mailer::{LogMailer, Mailer},
};

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub tokens: TokenService,
    pub mailer: Arc<dyn Mailer + Send + Sync>,
}

impl AppState {
    /// Connects to postgres and redis, applies migrations and wires the log mailer.
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;
        tracing::info!("Database connected");

        db.run_migrations().await?;

        let redis = redis_client::RedisClient::new(&config.redis.url).await?;
        tracing::info!("Redis connected");

        let mailer = Arc::new(LogMailer);
        Ok(Arc::new(Self::from_parts(config, db, redis, mailer)))
    }

    pub fn from_parts(
        config: config::Config,
        db: database::Database,
        redis: redis_client::RedisClient,
        mailer: Arc<dyn Mailer + Send + Sync>,
    ) -> Self {
        let cache = cache::CacheService::new(
            redis,
            config.redis.search_cache_ttl_seconds,
            config.features.enable_search_cache,
        );
        let tokens = TokenService::new(&config.jwt);
        Self { db, cache, config, tokens, mailer }
    }
}

/// The full HTTP surface: banner, health check and everything under `/api`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Corper Rides API v1.0" }))
        .route("/health", get(health))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.cache.ping().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            tracing::warn!("health check: redis unreachable: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Redis unavailable")
        }
    }
}
