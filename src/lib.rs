pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod errors;
pub mod grid;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod redis_client;
pub mod services;
pub mod validation;

use std::sync::Arc;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub redis: redis_client::RedisClient,
    pub cache: cache::CacheService,
    pub broadcaster: Arc<realtime::Broadcaster>,
    pub rate_limiter: middleware::RateLimiter,
    pub gateway: services::gateway::PaymentGatewayClient,
    pub config: config::Config,
}

impl AppState {
    pub async fn new(config: config::Config) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let db =
            database::Database::new(&config.database.url, config.database.pool_size).await?;

        db.run_migrations().await?;

        let redis = redis_client::RedisClient::new(&config.redis.url).await?;
        let cache = cache::CacheService::new(redis.clone(), db.clone());
        let broadcaster = Arc::new(realtime::Broadcaster::new());
        let rate_limiter = middleware::RateLimiter::new(
            redis.clone(),
            config.rate_limit.max_requests,
            config.rate_limit.window_seconds,
        );
        let gateway = services::gateway::PaymentGatewayClient::from_config(&config.payment);

        Ok(Arc::new(Self {
            db,
            redis,
            cache,
            broadcaster,
            rate_limiter,
            gateway,
            config,
        }))
    }
}
