use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::squares::SquareTile;
use crate::errors::AppResult;
use crate::middleware::AdminAuth;
use crate::models::event::Event;
use crate::services::events::{EventService, WinnerDetails};
use crate::validation::{validate_fields, FieldRule};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route("/events/{id}", get(get_event))
        .route("/events/{id}/squares", get(get_squares))
        .route("/events/{id}/squares/available", get(get_available_squares))
        .route("/events/{id}/open", post(open_selling))
        .route("/events/{id}/cancel", post(cancel_event))
        .route("/events/{id}/winner", post(declare_winner))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub name: String,
    pub description: Option<String>,
    pub grid_cols: Option<u32>,
    pub grid_rows: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclareWinnerRequest {
    pub square_id: Uuid,
}

// Карточка события: само событие плюс производные поля, которые клиент
// не должен считать сам (цены и приз — из конфигурации).
#[derive(Debug, Serialize)]
pub struct EventCard {
    #[serde(flatten)]
    pub event: Event,
    pub total_squares: i64,
    pub sold_squares: i64,
    pub currency: String,
    pub fixed_prize: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<WinnerDetails>,
}

pub async fn list_events(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<EventCard>>> {
    let service = EventService::new(state.clone());
    let events = service.list_events().await?;

    let mut cards = Vec::with_capacity(events.len());
    for event in events {
        let sold = service.sold_count(event.id).await?;
        cards.push(EventCard {
            total_squares: event.total_squares(),
            sold_squares: sold,
            currency: state.config.game.currency.clone(),
            fixed_prize: state.config.game.fixed_prize,
            winner: None,
            event,
        });
    }
    Ok(Json(cards))
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EventCard>> {
    let service = EventService::new(state.clone());
    let event = service.get_event(id).await?;
    let sold = service.sold_count(id).await?;
    let winner = service.winner_details(&event).await?;

    Ok(Json(EventCard {
        total_squares: event.total_squares(),
        sold_squares: sold,
        currency: state.config.game.currency.clone(),
        fixed_prize: state.config.game.fixed_prize,
        winner,
        event,
    }))
}

// Сетка целиком; горячий путь опроса, поэтому через кеш.
pub async fn get_squares(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<SquareTile>>> {
    // Несуществующее событие должно давать 404, а не пустую сетку.
    EventService::new(state.clone()).get_event(id).await?;
    let tiles = state.cache.get_event_squares(id).await?;
    Ok(Json(tiles))
}

pub async fn get_available_squares(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<SquareTile>>> {
    EventService::new(state.clone()).get_event(id).await?;
    let tiles = state.cache.get_event_squares(id).await?;
    let available: Vec<SquareTile> = tiles
        .into_iter()
        .filter(|t| t.status == "AVAILABLE")
        .collect();
    Ok(Json(available))
}

pub async fn create_event(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<Event>)> {
    validate_fields(&[(
        "name",
        Some(payload.name.as_str()),
        &[FieldRule::Required, FieldRule::MaxLen(200)],
    )])?;

    let event = EventService::new(state)
        .create_event(
            payload.name.trim(),
            payload.description.as_deref(),
            payload.grid_cols,
            payload.grid_rows,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn open_selling(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Event>> {
    let event = EventService::new(state).open_selling(id).await?;
    Ok(Json(event))
}

pub async fn cancel_event(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Event>> {
    let event = EventService::new(state).cancel_event(id).await?;
    Ok(Json(event))
}

pub async fn declare_winner(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeclareWinnerRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let (event, winner) = EventService::new(state)
        .declare_winner(id, payload.square_id)
        .await?;
    Ok(Json(json!({ "event": event, "winner": winner })))
}
