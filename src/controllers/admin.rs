use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::middleware::AdminAuth;
use crate::models::credit::PaymentCredit;
use crate::services::events::EventService;
use crate::services::ledger::{CreditLedger, NewCredit, PaymentChannel};
use crate::validation::{require_email_or_phone, validate_fields, FieldRule};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/cash-payment", post(record_cash_payment))
        .route("/admin/events/{id}/credits", get(list_event_credits))
        .route(
            "/admin/events/{id}/regenerate-squares",
            post(regenerate_squares),
        )
        .route("/credits/{id}/refund", post(refund_credit))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashPaymentRequest {
    pub event_id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub credit: PaymentCredit,
    /// Удалось ли вернуть деньги в шлюзе; для наличных всегда false.
    pub gateway_refunded: bool,
}

// Наличная оплата на месте: админ берёт деньги и сразу выдаёт
// CONFIRMED-кредит с удлинённым TTL.
pub async fn record_cash_payment(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CashPaymentRequest>,
) -> AppResult<Json<PaymentCredit>> {
    validate_fields(&[
        (
            "customerName",
            Some(payload.customer_name.as_str()),
            &[FieldRule::Required, FieldRule::MinLen(2), FieldRule::MaxLen(100)],
        ),
        (
            "customerEmail",
            payload.customer_email.as_deref(),
            &[FieldRule::Email, FieldRule::MaxLen(200)],
        ),
        (
            "customerPhone",
            payload.customer_phone.as_deref(),
            &[FieldRule::Phone, FieldRule::MaxLen(30)],
        ),
    ])?;
    require_email_or_phone(
        payload.customer_email.as_deref(),
        payload.customer_phone.as_deref(),
    )?;

    let credit = CreditLedger::new(state.clone())
        .create_credit(
            PaymentChannel::Cash,
            NewCredit {
                event_id: payload.event_id,
                customer_name: payload.customer_name.trim().to_string(),
                customer_email: payload.customer_email,
                customer_phone: payload.customer_phone,
                amount: state.config.game.square_price,
                payment_reference: None,
            },
        )
        .await?;

    Ok(Json(credit))
}

// Сверка кассы: все кредиты события со статусами.
pub async fn list_event_credits(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<PaymentCredit>>> {
    EventService::new(state.clone()).get_event(id).await?;
    let credits = CreditLedger::new(state).list_event_credits(id).await?;
    Ok(Json(credits))
}

pub async fn regenerate_squares(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let created = EventService::new(state).regenerate_squares(id).await?;
    Ok(Json(json!({ "squaresCreated": created })))
}

// Возврат кредита. Сначала журнал (источник истины), потом best-effort
// возврат в шлюзе: неудача шлюза не откатывает REFUNDED, деньги
// возвращают вручную.
pub async fn refund_credit(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RefundResponse>> {
    let credit = CreditLedger::new(state.clone()).refund_credit(id).await?;

    let is_cash = credit.payment_reference.starts_with("cash_");
    let gateway_refunded = if is_cash {
        false
    } else {
        match state
            .gateway
            .refund_order(&credit.payment_reference, "admin refund")
            .await
        {
            Ok(ok) => ok,
            Err(e) => {
                warn!(
                    "gateway refund failed for credit {} ({}): {}",
                    credit.id, credit.payment_reference, e
                );
                false
            }
        }
    };

    Ok(Json(RefundResponse {
        credit,
        gateway_refunded,
    }))
}
