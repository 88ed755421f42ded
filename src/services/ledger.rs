//! ledger.rs
//!
//! Журнал платёжных кредитов: создание, подтверждение, возврат,
//! ленивая экспирация при чтении.
//!
//! Кредит — единственный мост между оплатой и выбором квадрата.
//! Журнал никогда не трогает квадраты: тратит кредит только движок
//! аллокации, внутри своей транзакции.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::credit::{CreditStatus, PaymentCredit};
use crate::models::event::{Event, EventStatus};
use crate::AppState;

/// Канал оплаты определяет стартовый статус кредита и его TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentChannel {
    /// Наличные на месте: админ подтверждает оплату сразу, кредит
    /// рождается CONFIRMED с удлинённым TTL.
    Cash,
    /// Онлайн-шлюз: кредит PENDING до вебхука или явного подтверждения.
    Gateway,
}

#[derive(Debug, Clone)]
pub struct NewCredit {
    pub event_id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub amount: f64,
    /// Для Gateway — id платежа из шлюза; для Cash генерируется здесь.
    pub payment_reference: Option<String>,
}

#[derive(Clone)]
pub struct CreditLedger {
    state: Arc<AppState>,
}

impl CreditLedger {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Создаёт кредит после (ожидаемой или состоявшейся) оплаты.
    ///
    /// Продажа открыта только для событий в SELLING.
    pub async fn create_credit(
        &self,
        channel: PaymentChannel,
        new: NewCredit,
    ) -> AppResult<PaymentCredit> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(new.event_id)
            .fetch_optional(&self.state.db.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("event not found".to_string()))?;

        if event.status() != Some(EventStatus::Selling) {
            return Err(AppError::InvalidState("event not selling".to_string()));
        }

        let game = &self.state.config.game;
        let (status, ttl_minutes) = match channel {
            PaymentChannel::Cash => (CreditStatus::Confirmed, game.cash_credit_ttl_minutes),
            PaymentChannel::Gateway => (CreditStatus::Pending, game.credit_ttl_minutes),
        };

        let payment_reference = match new.payment_reference {
            Some(reference) => reference,
            None => format!("cash_{}", Uuid::new_v4()),
        };
        let expires_at = Utc::now() + Duration::minutes(ttl_minutes);

        let credit = sqlx::query_as::<_, PaymentCredit>(
            r#"
            INSERT INTO payment_credits
                (event_id, customer_name, customer_email, customer_phone,
                 payment_reference, amount, status, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new.event_id)
        .bind(&new.customer_name)
        .bind(&new.customer_email)
        .bind(&new.customer_phone)
        .bind(&payment_reference)
        .bind(new.amount)
        .bind(status.as_str())
        .bind(expires_at)
        .fetch_one(&self.state.db.pool)
        .await?;

        info!(
            "credit {} created for event {} via {:?}, status {}",
            credit.id, credit.event_id, channel, credit.status
        );
        Ok(credit)
    }

    /// Чтение кредита с ленивой экспирацией: просроченный PENDING или
    /// CONFIRMED при первом же чтении фиксируется как EXPIRED.
    /// Идемпотентно — повторное чтение ничего не меняет.
    pub async fn get_credit(&self, credit_id: Uuid) -> AppResult<PaymentCredit> {
        let credit = sqlx::query_as::<_, PaymentCredit>(
            "SELECT * FROM payment_credits WHERE id = $1",
        )
        .bind(credit_id)
        .fetch_optional(&self.state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("credit not found".to_string()))?;

        let now = Utc::now();
        let live = matches!(
            credit.status(),
            Some(CreditStatus::Pending) | Some(CreditStatus::Confirmed)
        );
        if live && credit.is_expired_at(now) {
            // Условный UPDATE: гонка с аллокацией или вторым чтением
            // безопасна, выиграет ровно одна запись статуса.
            let expired = sqlx::query_as::<_, PaymentCredit>(
                r#"
                UPDATE payment_credits
                SET status = 'EXPIRED'
                WHERE id = $1 AND status IN ('PENDING', 'CONFIRMED')
                RETURNING *
                "#,
            )
            .bind(credit_id)
            .fetch_optional(&self.state.db.pool)
            .await?;

            if let Some(expired) = expired {
                info!("credit {} lazily expired on read", credit_id);
                return Ok(expired);
            }
            // Кто-то успел раньше: перечитываем финальное состояние.
            return sqlx::query_as::<_, PaymentCredit>(
                "SELECT * FROM payment_credits WHERE id = $1",
            )
            .bind(credit_id)
            .fetch_optional(&self.state.db.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("credit not found".to_string()));
        }

        Ok(credit)
    }

    /// PENDING → CONFIRMED. Повторное подтверждение — no-op.
    pub async fn confirm_credit(&self, credit_id: Uuid) -> AppResult<PaymentCredit> {
        let confirmed = sqlx::query_as::<_, PaymentCredit>(
            r#"
            UPDATE payment_credits
            SET status = 'CONFIRMED'
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(credit_id)
        .fetch_optional(&self.state.db.pool)
        .await?;

        if let Some(credit) = confirmed {
            info!("credit {} confirmed", credit.id);
            return Ok(credit);
        }

        // Разбираемся, почему условный UPDATE никого не затронул.
        let credit = self.get_credit(credit_id).await?;
        match credit.status() {
            Some(CreditStatus::Confirmed) => Ok(credit),
            Some(other) => Err(AppError::InvalidState(format!(
                "credit cannot be confirmed from status {}",
                other.as_str()
            ))),
            None => Err(AppError::Internal(format!(
                "credit {} has unknown status {}",
                credit.id, credit.status
            ))),
        }
    }

    /// Подтверждение по внешней ссылке платежа (путь вебхука).
    /// Неизвестная ссылка — NotFound, остальное как confirm_credit.
    pub async fn confirm_by_reference(&self, payment_reference: &str) -> AppResult<PaymentCredit> {
        let credit_id = self.credit_id_by_reference(payment_reference).await?;
        self.confirm_credit(credit_id).await
    }

    /// Возврат по внешней ссылке платежа (вебхук о refund в шлюзе).
    pub async fn refund_by_reference(&self, payment_reference: &str) -> AppResult<PaymentCredit> {
        let credit_id = self.credit_id_by_reference(payment_reference).await?;
        self.refund_credit(credit_id).await
    }

    /// Возврат кредита. USED вернуть нельзя: квадрат уже продан.
    pub async fn refund_credit(&self, credit_id: Uuid) -> AppResult<PaymentCredit> {
        let refunded = sqlx::query_as::<_, PaymentCredit>(
            r#"
            UPDATE payment_credits
            SET status = 'REFUNDED'
            WHERE id = $1 AND status IN ('PENDING', 'CONFIRMED', 'EXPIRED')
            RETURNING *
            "#,
        )
        .bind(credit_id)
        .fetch_optional(&self.state.db.pool)
        .await?;

        if let Some(credit) = refunded {
            info!("credit {} refunded", credit.id);
            return Ok(credit);
        }

        let credit = sqlx::query_as::<_, PaymentCredit>(
            "SELECT * FROM payment_credits WHERE id = $1",
        )
        .bind(credit_id)
        .fetch_optional(&self.state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("credit not found".to_string()))?;

        match credit.status() {
            Some(CreditStatus::Used) => {
                Err(AppError::Conflict("credit already used".to_string()))
            }
            Some(CreditStatus::Refunded) => Ok(credit),
            _ => Err(AppError::InvalidState(format!(
                "credit cannot be refunded from status {}",
                credit.status
            ))),
        }
    }

    /// Все кредиты события для админской сверки кассы.
    pub async fn list_event_credits(&self, event_id: Uuid) -> AppResult<Vec<PaymentCredit>> {
        let credits = sqlx::query_as::<_, PaymentCredit>(
            "SELECT * FROM payment_credits WHERE event_id = $1 ORDER BY created_at DESC",
        )
        .bind(event_id)
        .fetch_all(&self.state.db.pool)
        .await?;
        Ok(credits)
    }

    async fn credit_id_by_reference(&self, payment_reference: &str) -> AppResult<Uuid> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM payment_credits WHERE payment_reference = $1")
                .bind(payment_reference)
                .fetch_optional(&self.state.db.pool)
                .await?;
        row.map(|(id,)| id)
            .ok_or_else(|| AppError::NotFound("credit not found".to_string()))
    }
}
