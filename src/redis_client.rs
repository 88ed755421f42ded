use redis::{aio::MultiplexedConnection, Client};

/// Общее мультиплексированное соединение с Redis: кеш сетки и
/// счётчики rate limiter'а. Клонируется дёшево, по клону на запрос.
#[derive(Clone)]
pub struct RedisClient {
    pub conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_tokio_connection().await?;

        // Явный ping при старте: лучше упасть на буте, чем на первом запросе
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(RedisClient { conn })
    }

    /// Живо ли соединение, для health-проверок.
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }
}
