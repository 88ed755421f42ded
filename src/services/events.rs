//! events.rs
//!
//! Жизненный цикл события: создание с генерацией сетки, открытие продажи,
//! отмена, объявление победителя, пересборка сетки.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::grid;
use crate::models::event::{Event, EventStatus};
use crate::models::purchase::SquarePurchase;
use crate::models::square::{Square, SquareStatus};
use crate::AppState;

/// Победитель для ответа админу и публичной карточки события.
#[derive(Debug, Clone, Serialize)]
pub struct WinnerDetails {
    pub square_id: Uuid,
    pub square_number: i32,
    pub position: String,
    pub owner_initials: String,
    pub customer_full_name: String,
    pub confirmation_code: String,
}

#[derive(Clone)]
pub struct EventService {
    state: Arc<AppState>,
}

impl EventService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Создаёт событие в DRAFT и всю его сетку одной транзакцией.
    ///
    /// Квадраты рождаются ровно один раз: повторной генерации при
    /// обычной жизни события нет, только явная пересборка в DRAFT.
    pub async fn create_event(
        &self,
        name: &str,
        description: Option<&str>,
        grid_cols: Option<u32>,
        grid_rows: Option<u32>,
    ) -> AppResult<Event> {
        let game = &self.state.config.game;
        let cols = grid_cols.unwrap_or(game.grid_cols);
        let rows = grid_rows.unwrap_or(game.grid_rows);

        // Верхняя граница защищает bulk insert, а не бизнес-правило.
        // Произведение считается в u64: u32 * u32 может перевернуться.
        if cols == 0 || rows == 0 || cols as u64 * rows as u64 > 10_000 {
            return Err(AppError::Validation(
                "grid dimensions out of range".to_string(),
            ));
        }

        let mut tx = self.state.db.pool.begin().await?;

        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (name, description, status, square_price, grid_cols, grid_rows)
            VALUES ($1, $2, 'DRAFT', $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(game.square_price)
        .bind(cols as i32)
        .bind(rows as i32)
        .fetch_one(&mut *tx)
        .await?;

        self.insert_grid(&mut tx, event.id, cols, rows).await?;
        tx.commit().await?;

        info!(
            "event {} created with {}x{} grid ({} squares)",
            event.id,
            cols,
            rows,
            cols * rows
        );
        Ok(event)
    }

    pub async fn get_event(&self, event_id: Uuid) -> AppResult<Event> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.state.db.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("event not found".to_string()))
    }

    pub async fn list_events(&self) -> AppResult<Vec<Event>> {
        let events =
            sqlx::query_as::<_, Event>("SELECT * FROM events ORDER BY created_at DESC")
                .fetch_all(&self.state.db.pool)
                .await?;
        Ok(events)
    }

    /// Число проданных квадратов события.
    pub async fn sold_count(&self, event_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM squares WHERE event_id = $1 AND status = 'TAKEN'",
        )
        .bind(event_id)
        .fetch_one(&self.state.db.pool)
        .await?;
        Ok(count)
    }

    /// DRAFT → SELLING.
    pub async fn open_selling(&self, event_id: Uuid) -> AppResult<Event> {
        self.transition(event_id, EventStatus::Selling).await
    }

    /// Отмена из любого нетерминального статуса.
    pub async fn cancel_event(&self, event_id: Uuid) -> AppResult<Event> {
        self.transition(event_id, EventStatus::Cancelled).await
    }

    /// Объявляет победивший квадрат и закрывает событие.
    ///
    /// Квадрат обязан быть TAKEN: выигравший пустой квадрат означает
    /// перерозыгрыш на стороне организатора, а не запись в БД.
    pub async fn declare_winner(
        &self,
        event_id: Uuid,
        square_id: Uuid,
    ) -> AppResult<(Event, WinnerDetails)> {
        let mut tx = self.state.db.pool.begin().await?;

        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1 FOR UPDATE")
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("event not found".to_string()))?;

        let current = event
            .status()
            .ok_or_else(|| AppError::Internal(format!("unknown event status {}", event.status)))?;
        if !current.can_transition_to(EventStatus::Completed) {
            return Err(AppError::InvalidState(format!(
                "cannot declare winner from status {}",
                event.status
            )));
        }

        let square = sqlx::query_as::<_, Square>("SELECT * FROM squares WHERE id = $1")
            .bind(square_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("square not found".to_string()))?;

        if square.event_id != event_id {
            return Err(AppError::Validation("square/event mismatch".to_string()));
        }
        if square.status() != Some(SquareStatus::Taken) {
            return Err(AppError::InvalidState(
                "winning square has no owner".to_string(),
            ));
        }

        let purchase = sqlx::query_as::<_, SquarePurchase>(
            "SELECT * FROM square_purchases WHERE square_id = $1",
        )
        .bind(square_id)
        .fetch_one(&mut *tx)
        .await?;

        let event = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET status = 'COMPLETED', winner_square_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(square_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "event {} completed, winner square {} ({})",
            event_id, square.square_number, square.position
        );

        Ok((
            event,
            WinnerDetails {
                square_id,
                square_number: square.square_number,
                position: square.position,
                owner_initials: purchase.customer_name_initials,
                customer_full_name: purchase.customer_full_name,
                confirmation_code: purchase.confirmation_code,
            },
        ))
    }

    /// Детали победителя завершённого события, если он объявлен.
    pub async fn winner_details(&self, event: &Event) -> AppResult<Option<WinnerDetails>> {
        let square_id = match event.winner_square_id {
            Some(id) => id,
            None => return Ok(None),
        };

        #[derive(sqlx::FromRow)]
        struct WinnerRow {
            square_number: i32,
            position: String,
            customer_name_initials: String,
            customer_full_name: String,
            confirmation_code: String,
        }

        let row = sqlx::query_as::<_, WinnerRow>(
            r#"
            SELECT s.square_number, s.position,
                   p.customer_name_initials, p.customer_full_name, p.confirmation_code
            FROM squares s
            JOIN square_purchases p ON p.square_id = s.id
            WHERE s.id = $1
            "#,
        )
        .bind(square_id)
        .fetch_optional(&self.state.db.pool)
        .await?;

        Ok(row.map(|r| WinnerDetails {
            square_id,
            square_number: r.square_number,
            position: r.position,
            owner_initials: r.customer_name_initials,
            customer_full_name: r.customer_full_name,
            confirmation_code: r.confirmation_code,
        }))
    }

    /// Пересобирает сетку события: только в DRAFT и только если текущее
    /// число квадратов не совпадает с grid_cols*grid_rows (ремонт после
    /// ручных правок размеров). Занятые квадраты блокируют пересборку.
    pub async fn regenerate_squares(&self, event_id: Uuid) -> AppResult<u64> {
        let mut tx = self.state.db.pool.begin().await?;

        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1 FOR UPDATE")
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("event not found".to_string()))?;

        if event.status() != Some(EventStatus::Draft) {
            return Err(AppError::InvalidState(
                "squares can only be regenerated while event is draft".to_string(),
            ));
        }

        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM squares WHERE event_id = $1 AND status <> 'AVAILABLE'",
        )
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;
        if taken > 0 {
            return Err(AppError::InvalidState(
                "cannot regenerate: some squares are already taken".to_string(),
            ));
        }

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM squares WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&mut *tx)
            .await?;
        if existing == event.total_squares() {
            return Ok(0);
        }

        sqlx::query("DELETE FROM squares WHERE event_id = $1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        let created = self
            .insert_grid(&mut tx, event_id, event.grid_cols as u32, event.grid_rows as u32)
            .await?;
        tx.commit().await?;

        info!("event {} grid regenerated: {} squares", event_id, created);
        Ok(created)
    }

    /// Вставка всей сетки одним INSERT через UNNEST.
    async fn insert_grid(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: Uuid,
        cols: u32,
        rows: u32,
    ) -> AppResult<u64> {
        let cells = grid::generate_cells(cols, rows);

        let xs: Vec<i32> = cells.iter().map(|c| c.grid_x as i32).collect();
        let ys: Vec<i32> = cells.iter().map(|c| c.grid_y as i32).collect();
        let numbers: Vec<i32> = cells.iter().map(|c| c.square_number as i32).collect();
        let positions: Vec<String> = cells.iter().map(|c| c.position.clone()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO squares (event_id, grid_x, grid_y, square_number, position, status)
            SELECT $1, x, y, n, p, 'AVAILABLE'
            FROM UNNEST($2::int4[], $3::int4[], $4::int4[], $5::text[]) AS t(x, y, n, p)
            "#,
        )
        .bind(event_id)
        .bind(&xs)
        .bind(&ys)
        .bind(&numbers)
        .bind(&positions)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Условный переход статуса; проигрыш гонки виден как InvalidState.
    async fn transition(&self, event_id: Uuid, next: EventStatus) -> AppResult<Event> {
        let event = self.get_event(event_id).await?;
        let current = event
            .status()
            .ok_or_else(|| AppError::Internal(format!("unknown event status {}", event.status)))?;

        if !current.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "cannot transition event from {} to {}",
                event.status,
                next.as_str()
            )));
        }

        let updated = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(&event.status)
        .bind(next.as_str())
        .fetch_optional(&self.state.db.pool)
        .await?
        .ok_or_else(|| {
            AppError::InvalidState(format!(
                "event status changed concurrently, cannot move to {}",
                next.as_str()
            ))
        })?;

        info!("event {} transitioned {} -> {}", event_id, event.status, updated.status);
        Ok(updated)
    }
}
