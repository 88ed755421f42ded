use axum::{
    extract::{ConnectInfo, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::credit::PaymentCredit;
use crate::services::gateway::GatewayError;
use crate::services::ledger::{CreditLedger, NewCredit, PaymentChannel};
use crate::validation::{require_email_or_phone, validate_fields, FieldRule};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/credits", post(create_credit))
        .route("/credits/{id}", get(get_credit))
        .route("/credits/{id}/confirm", post(confirm_credit))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCreditRequest {
    pub event_id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCreditResponse {
    pub credit: PaymentCredit,
    /// Куда отправить покупателя платить; None в мок-режиме без редиректа.
    pub payment_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditView {
    #[serde(flatten)]
    pub credit: PaymentCredit,
    pub can_select_square: bool,
}

// Создание кредита через онлайн-шлюз. Точка входа покупателя, поэтому
// единственный rate-limited маршрут.
pub async fn create_credit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<CreateCreditRequest>,
) -> AppResult<Json<CreateCreditResponse>> {
    if !state
        .rate_limiter
        .allow("credits", &addr.ip().to_string())
        .await
    {
        return Err(AppError::RateLimited(
            "Too many payment attempts, please wait a minute".to_string(),
        ));
    }

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

    let game = &state.config.game;
    let order = state
        .gateway
        .create_order(
            game.square_price,
            &game.currency,
            "Square lottery entry",
            payload.customer_email.as_deref(),
            &format!("credit-{}", payload.event_id),
        )
        .await
        .map_err(map_gateway_error)?;

    let credit = CreditLedger::new(state.clone())
        .create_credit(
            PaymentChannel::Gateway,
            NewCredit {
                event_id: payload.event_id,
                customer_name: payload.customer_name.trim().to_string(),
                customer_email: payload.customer_email,
                customer_phone: payload.customer_phone,
                amount: game.square_price,
                payment_reference: Some(order.payment_id),
            },
        )
        .await?;

    Ok(Json(CreateCreditResponse {
        credit,
        payment_url: order.redirect_url,
    }))
}

// Чтение кредита покупателем в ожидании подтверждения оплаты.
// Здесь же срабатывает ленивая экспирация.
pub async fn get_credit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CreditView>> {
    let credit = CreditLedger::new(state).get_credit(id).await?;
    let can_select_square = credit.can_select_square(chrono::Utc::now());
    Ok(Json(CreditView {
        credit,
        can_select_square,
    }))
}

// Явное подтверждение оплаты (ручная сверка, когда вебхук не дошёл).
pub async fn confirm_credit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PaymentCredit>> {
    let credit = CreditLedger::new(state).confirm_credit(id).await?;
    Ok(Json(credit))
}

fn map_gateway_error(err: GatewayError) -> AppError {
    match err {
        GatewayError::CircuitOpen => AppError::Internal(
            "payment gateway temporarily unavailable".to_string(),
        ),
        GatewayError::Http(e) => AppError::Internal(format!("payment gateway error: {}", e)),
        GatewayError::Api(status) => {
            AppError::Internal(format!("payment gateway returned status {}", status))
        }
    }
}
