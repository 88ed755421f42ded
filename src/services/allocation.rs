//! allocation.rs
//!
//! Движок атомарной аллокации: трата CONFIRMED-кредита на свободный
//! квадрат. Вся проверка и все эффекты — в одной транзакции с блокировкой
//! строк кредита и квадрата. Два уникальных ограничения на
//! `square_purchases` (credit_id и square_id) — структурная страховка:
//! даже при ошибке в логике блокировок двойная трата упрётся в 23505.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::errors::{is_unique_violation, AppError, AppResult};
use crate::models::credit::{CreditStatus, PaymentCredit};
use crate::models::event::{Event, EventStatus};
use crate::models::purchase::{generate_confirmation_code, name_initials};
use crate::models::square::{Square, SquareStatus};
use crate::realtime::SquareSelected;
use crate::AppState;

/// Результат успешной аллокации, отдаётся покупателю.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome {
    pub purchase_id: Uuid,
    pub event_id: Uuid,
    pub square_id: Uuid,
    pub square_number: i32,
    pub position: String,
    pub confirmation_code: String,
    pub owner_initials: String,
    /// Событие перешло в SOLD_OUT этой самой аллокацией.
    pub sold_out: bool,
}

#[derive(Clone)]
pub struct AllocationEngine {
    state: Arc<AppState>,
}

impl AllocationEngine {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Потратить кредит на квадрат.
    ///
    /// Порядок проверок фиксирован: кредит найден → событие продаёт →
    /// кредит CONFIRMED → кредит не просрочен → кредит ещё не тратился →
    /// квадрат найден → квадрат того же события → квадрат свободен.
    /// Первая провалившаяся проверка определяет ошибку клиенту.
    pub async fn allocate(&self, credit_id: Uuid, square_id: Uuid) -> AppResult<AllocationOutcome> {
        let result = self.try_allocate(credit_id, square_id).await;

        match result {
            Ok(outcome) => {
                self.after_commit(&outcome).await;
                Ok(outcome)
            }
            Err(e) => Err(map_allocation_error(e)),
        }
    }

    async fn try_allocate(
        &self,
        credit_id: Uuid,
        square_id: Uuid,
    ) -> AppResult<AllocationOutcome> {
        let mut tx = self.state.db.pool.begin().await?;

        // Не ждать чужую транзакцию дольше 5 секунд: лучше отдать 409
        // и предложить повтор, чем копить очередь на горячем квадрате.
        sqlx::query("SET LOCAL lock_timeout = '5s'")
            .execute(&mut *tx)
            .await?;

        // Блокируем кредит первым: порядок credit → square одинаков во
        // всех транзакциях, взаимная блокировка исключена.
        let credit = sqlx::query_as::<_, PaymentCredit>(
            "SELECT * FROM payment_credits WHERE id = $1 FOR UPDATE",
        )
        .bind(credit_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("credit not found".to_string()))?;

        // FOR SHARE: конкурирующие аллокации не мешают друг другу, но
        // declare_winner/cancel (FOR UPDATE) не может закрыть событие,
        // пока эта транзакция не зафиксируется.
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1 FOR SHARE")
            .bind(credit.event_id)
            .fetch_one(&mut *tx)
            .await?;

        if event.status() != Some(EventStatus::Selling) {
            return Err(AppError::InvalidState("event not selling".to_string()));
        }

        match credit.status() {
            Some(CreditStatus::Confirmed) => {}
            Some(CreditStatus::Used) => {
                return Err(AppError::Conflict("credit already used".to_string()));
            }
            Some(CreditStatus::Expired) => {
                return Err(AppError::Expired("credit expired".to_string()));
            }
            _ => {
                return Err(AppError::InvalidState(format!(
                    "credit not confirmed (status {})",
                    credit.status
                )));
            }
        }

        let now = Utc::now();
        if credit.is_expired_at(now) {
            // Фиксируем экспирацию и коммитим её отдельно: отказ в
            // аллокации не должен откатывать переход в EXPIRED.
            sqlx::query(
                "UPDATE payment_credits SET status = 'EXPIRED' \
                 WHERE id = $1 AND status = 'CONFIRMED'",
            )
            .bind(credit_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Err(AppError::Expired("credit expired".to_string()));
        }

        // Кредит уже потрачен? Уникальный индекс по credit_id гарантирует
        // не больше одной записи.
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM square_purchases WHERE credit_id = $1")
                .bind(credit_id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("credit already used".to_string()));
        }

        let square = sqlx::query_as::<_, Square>(
            "SELECT * FROM squares WHERE id = $1 FOR UPDATE",
        )
        .bind(square_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("square not found".to_string()))?;

        if square.event_id != credit.event_id {
            return Err(AppError::Validation("square/event mismatch".to_string()));
        }

        if square.status() != Some(SquareStatus::Available) {
            return Err(AppError::Conflict("square not available".to_string()));
        }

        // Все проверки пройдены: три эффекта одной транзакцией.
        let confirmation_code = generate_confirmation_code();
        let initials = name_initials(&credit.customer_name);

        let purchase_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO square_purchases
                (square_id, credit_id, customer_name_initials,
                 customer_full_name, confirmation_code)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(square_id)
        .bind(credit_id)
        .bind(&initials)
        .bind(&credit.customer_name)
        .bind(&confirmation_code)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE squares SET status = 'TAKEN', owner_id = $2, selected_at = $3 \
             WHERE id = $1",
        )
        .bind(square_id)
        .bind(credit.contact())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE payment_credits SET status = 'USED' WHERE id = $1")
            .bind(credit_id)
            .execute(&mut *tx)
            .await?;

        // Последний свободный квадрат закрывает продажу.
        let sold_out = sqlx::query_scalar::<_, bool>(
            r#"
            UPDATE events
            SET status = 'SOLD_OUT', updated_at = NOW()
            WHERE id = $1
              AND status = 'SELLING'
              AND NOT EXISTS (
                  SELECT 1 FROM squares
                  WHERE event_id = $1 AND status = 'AVAILABLE'
              )
            RETURNING true
            "#,
        )
        .bind(credit.event_id)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(false);

        tx.commit().await?;

        info!(
            "square {} ({}) allocated to credit {} on event {}{}",
            square.square_number,
            square.position,
            credit_id,
            credit.event_id,
            if sold_out { ", event SOLD_OUT" } else { "" }
        );

        Ok(AllocationOutcome {
            purchase_id,
            event_id: credit.event_id,
            square_id,
            square_number: square.square_number,
            position: square.position,
            confirmation_code,
            owner_initials: initials,
            sold_out,
        })
    }

    /// Эффекты после коммита: сброс кеша и уведомление наблюдателей.
    /// Оба best-effort, аллокация уже состоялась.
    async fn after_commit(&self, outcome: &AllocationOutcome) {
        self.state.cache.invalidate_squares(outcome.event_id).await;

        let receivers = self.state.broadcaster.publish(SquareSelected {
            event_id: outcome.event_id,
            square_id: outcome.square_id,
            square_number: outcome.square_number,
            owner_initials: outcome.owner_initials.clone(),
            selected_at: Utc::now(),
        });
        if receivers > 0 {
            info!("allocation broadcast to {} observers", receivers);
        }
    }
}

/// Перевод низкоуровневых ошибок Postgres в доменные.
///
/// 23505 по `square_purchases` означает, что конкурирующая транзакция
/// успела раньше; имя ограничения говорит, за что именно проиграли гонку.
/// 55P03 — не дождались блокировки строки, повторяемый конфликт.
fn map_allocation_error(err: AppError) -> AppError {
    let mapped = match &err {
        AppError::Database(db_err) if is_unique_violation(db_err) => {
            let constraint = match db_err {
                sqlx::Error::Database(db) => db.constraint(),
                _ => None,
            };
            match constraint {
                Some("square_purchases_credit_id_key") => {
                    Some(AppError::Conflict("credit already used".to_string()))
                }
                Some("square_purchases_square_id_key") => {
                    Some(AppError::Conflict("square not available".to_string()))
                }
                _ => None,
            }
        }
        AppError::Database(sqlx::Error::Database(db)) if db.code().as_deref() == Some("55P03") => {
            Some(AppError::Conflict(
                "square is being allocated by another request, try again".to_string(),
            ))
        }
        _ => None,
    };

    mapped.unwrap_or(err)
}
