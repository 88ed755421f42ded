use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::services::allocation::{AllocationEngine, AllocationOutcome};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/squares/select", post(select_square))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectSquareRequest {
    pub credit_id: Uuid,
    pub square_id: Uuid,
}

// Ядро всей системы: трата кредита на квадрат. Вся логика в движке
// аллокации, контроллер только передаёт идентификаторы.
pub async fn select_square(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SelectSquareRequest>,
) -> AppResult<Json<AllocationOutcome>> {
    let outcome = AllocationEngine::new(state)
        .allocate(payload.credit_id, payload.square_id)
        .await?;
    Ok(Json(outcome))
}
