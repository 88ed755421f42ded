use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::services::ledger::CreditLedger;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/payment", post(payment_webhook))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    OrderCompleted,
    OrderPaymentFailed,
    OrderRefunded,
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub event: WebhookEvent,
    pub order_id: String,
}

// Вебхук шлюза. Ответ всегда 200 с обработанным/пропущенным флагом:
// шлюзы ретраят не-2xx, а повторная доставка уже учтённого события
// не должна превращаться в шторм ретраев.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PaymentWebhook>,
) -> AppResult<Json<serde_json::Value>> {
    let ledger = CreditLedger::new(state);

    let result = match payload.event {
        WebhookEvent::OrderCompleted => ledger.confirm_by_reference(&payload.order_id).await,
        WebhookEvent::OrderRefunded | WebhookEvent::OrderPaymentFailed => {
            ledger.refund_by_reference(&payload.order_id).await
        }
    };

    match result {
        Ok(credit) => {
            info!(
                "webhook {:?} applied to credit {} (now {})",
                payload.event, credit.id, credit.status
            );
            Ok(Json(json!({ "received": true, "processed": true })))
        }
        // Неизвестная ссылка или уже финальный статус: подтверждаем
        // доставку, но помечаем как пропущенное.
        Err(AppError::NotFound(_)) | Err(AppError::InvalidState(_)) | Err(AppError::Conflict(_)) => {
            warn!(
                "webhook {:?} for order {} skipped",
                payload.event, payload.order_id
            );
            Ok(Json(json!({ "received": true, "processed": false })))
        }
        Err(e) => Err(e),
    }
}
