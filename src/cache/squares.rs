use crate::cache::CacheService;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// TTL кеша сетки. Короткий: основной механизм свежести —
/// инвалидация после каждой зафиксированной аллокации.
const SQUARES_TTL_SECONDS: u64 = 30;

/// Плитка сетки для отображения: квадрат плюс инициалы владельца
/// из снимка покупки.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SquareTile {
    pub id: Uuid,
    pub square_number: i32,
    pub grid_x: i32,
    pub grid_y: i32,
    pub position: String,
    pub status: String,
    pub owner_initials: Option<String>,
    pub selected_at: Option<DateTime<Utc>>,
}

impl CacheService {
    /// Сетка события для опроса клиентами: сперва кеш, иначе БД + прогрев.
    pub async fn get_event_squares(&self, event_id: Uuid) -> Result<Vec<SquareTile>, sqlx::Error> {
        if let Ok(Some(tiles)) = self.get_squares_from_cache(event_id).await {
            return Ok(tiles);
        }

        let tiles = self.load_squares_from_db(event_id).await?;
        let _ = self.save_squares_to_cache(event_id, &tiles).await;
        Ok(tiles)
    }

    /// Сбросить кеш сетки после зафиксированной записи.
    pub async fn invalidate_squares(&self, event_id: Uuid) {
        let mut conn = self.redis().conn.clone();
        let _: Result<(), _> = conn.del(Self::squares_key(event_id)).await;
    }

    async fn load_squares_from_db(&self, event_id: Uuid) -> Result<Vec<SquareTile>, sqlx::Error> {
        sqlx::query_as::<_, SquareTile>(
            r#"
            SELECT s.id, s.square_number, s.grid_x, s.grid_y, s.position, s.status,
                   p.customer_name_initials AS owner_initials, s.selected_at
            FROM squares s
            LEFT JOIN square_purchases p ON p.square_id = s.id
            WHERE s.event_id = $1
            ORDER BY s.square_number
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.db().pool)
        .await
    }

    async fn get_squares_from_cache(
        &self,
        event_id: Uuid,
    ) -> Result<Option<Vec<SquareTile>>, redis::RedisError> {
        let mut conn = self.redis().conn.clone();
        let data: Option<String> = conn.get(Self::squares_key(event_id)).await?;
        Ok(data.and_then(|d| serde_json::from_str(&d).ok()))
    }

    async fn save_squares_to_cache(
        &self,
        event_id: Uuid,
        tiles: &[SquareTile],
    ) -> Result<(), redis::RedisError> {
        let data = serde_json::to_string(tiles).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error"))
        })?;
        let mut conn = self.redis().conn.clone();
        conn.set_ex(Self::squares_key(event_id), data, SQUARES_TTL_SECONDS)
            .await
    }

    fn squares_key(event_id: Uuid) -> String {
        format!("squares:{}", event_id)
    }
}
