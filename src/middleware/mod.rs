use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::warn;

use crate::redis_client::RedisClient;

/// Маркер админского запроса.
///
/// Механика аутентификации вне контракта ядра: достаточно общего
/// токена из конфигурации в заголовке X-Admin-Token.
#[derive(Debug, Clone)]
pub struct AdminAuth;

impl FromRequestParts<Arc<crate::AppState>> for AdminAuth {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("x-admin-token")
            .and_then(|value| value.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "No admin token provided".to_string()))?;

        if token != state.config.admin.token {
            return Err((StatusCode::UNAUTHORIZED, "Invalid admin token".to_string()));
        }

        Ok(AdminAuth)
    }
}

/// Rate limiter со счётчиками в Redis: INCR + EXPIRE на окно.
///
/// Явный компонент с собственным хранилищем, передаётся обработчикам
/// через `AppState`, а не через процесс-глобальную мапу.
#[derive(Clone)]
pub struct RateLimiter {
    redis: RedisClient,
    max_requests: u32,
    window_seconds: u64,
}

impl RateLimiter {
    pub fn new(redis: RedisClient, max_requests: u32, window_seconds: u64) -> Self {
        Self {
            redis,
            max_requests,
            window_seconds,
        }
    }

    /// Разрешён ли очередной запрос клиента в данной области (scope).
    ///
    /// При недоступности Redis пропускает запрос: лимитер — защита от
    /// злоупотребления, а не корректностный инвариант.
    pub async fn allow(&self, scope: &str, client_id: &str) -> bool {
        let key = format!("rl:{}:{}", scope, client_id);
        let mut conn = self.redis.conn.clone();

        // Ключ окна заводится атомарно с TTL (SET NX EX), и только потом
        // инкрементируется: счётчик без TTL заблокировал бы клиента навсегда.
        let created: Result<(), redis::RedisError> = redis::cmd("SET")
            .arg(&key)
            .arg(0u32)
            .arg("NX")
            .arg("EX")
            .arg(self.window_seconds)
            .query_async(&mut conn)
            .await;
        if let Err(e) = created {
            warn!("rate limiter unavailable, allowing request: {:?}", e);
            return true;
        }

        let count: Result<u32, redis::RedisError> = conn.incr(&key, 1u32).await;
        match count {
            Ok(1) => {
                // Ключ истёк между SET NX и INCR, и INCR пересоздал его
                // без TTL. Чиним окно повторным EXPIRE.
                let _: Result<bool, _> =
                    conn.expire(&key, self.window_seconds as i64).await;
                true
            }
            Ok(n) => n <= self.max_requests,
            Err(e) => {
                warn!("rate limiter unavailable, allowing request: {:?}", e);
                true
            }
        }
    }
}
