use crate::{database::Database, redis_client::RedisClient};

pub mod squares;

/// Кеш поверх Redis для горячих read-путей (сетка квадратов).
/// Пишущий путь обязан инвалидировать кеш после коммита, чтобы
/// опрос как резервный канал консистентности видел только
/// зафиксированное состояние.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    db: Database,
}

impl CacheService {
    pub fn new(redis: RedisClient, db: Database) -> Self {
        Self { redis, db }
    }

    pub(crate) fn redis(&self) -> &RedisClient {
        &self.redis
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }
}
