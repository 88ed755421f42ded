//! cleanup.rs
//!
//! Фоновая подметалка: страховка поверх ленивой экспирации при чтении.
//! Кредиты, которые никто не читает, всё равно становятся EXPIRED, и
//! админская сверка видит честную картину без обращения к каждому кредиту.

use std::sync::Arc;
use tracing::{error, info};

use crate::AppState;

#[derive(Clone)]
pub struct ExpirySweeper {
    state: Arc<AppState>,
}

impl ExpirySweeper {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Один проход: массовая экспирация + закрытие распроданных событий.
    /// Ошибки логируются, следующий проход попробует снова.
    pub async fn run_once(&self) {
        match self.expire_stale_credits().await {
            Ok(0) => {}
            Ok(n) => info!("expired {} stale payment credits", n),
            Err(e) => error!("credit expiry sweep failed: {:?}", e),
        }

        match self.close_sold_out_events().await {
            Ok(0) => {}
            Ok(n) => info!("marked {} events SOLD_OUT", n),
            Err(e) => error!("sold-out sweep failed: {:?}", e),
        }
    }

    /// Просроченные PENDING/CONFIRMED → EXPIRED одним UPDATE.
    /// Условие по статусу делает проход идемпотентным и безопасным
    /// при гонке с ленивой экспирацией и с аллокацией.
    async fn expire_stale_credits(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payment_credits
            SET status = 'EXPIRED'
            WHERE status IN ('PENDING', 'CONFIRMED')
              AND expires_at < NOW()
            "#,
        )
        .execute(&self.state.db.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Подстраховка авто-перехода SELLING → SOLD_OUT: основной переход
    /// делает сама аллокация, здесь добираются события, где он не сработал
    /// (например, после ручных правок квадратов).
    async fn close_sold_out_events(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE events e
            SET status = 'SOLD_OUT', updated_at = NOW()
            WHERE e.status = 'SELLING'
              AND NOT EXISTS (
                  SELECT 1 FROM squares s
                  WHERE s.event_id = e.id AND s.status = 'AVAILABLE'
              )
              AND EXISTS (SELECT 1 FROM squares s WHERE s.event_id = e.id)
            "#,
        )
        .execute(&self.state.db.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
