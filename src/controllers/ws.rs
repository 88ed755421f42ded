use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppResult;
use crate::services::events::EventService;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws/events/{id}", get(ws_handler))
}

// Живая трансляция аллокаций события. Доставка best-effort: клиент,
// потерявший соединение или отставший, обязан свериться опросом сетки.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Response> {
    // 404 до апгрейда: на несуществующее событие не подписываемся
    EventService::new(state.clone()).get_event(event_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, event_id)))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, event_id: Uuid) {
    let mut rx = state.broadcaster.subscribe(event_id);
    info!(
        "websocket observer joined event {} ({} total)",
        event_id,
        state.broadcaster.observer_count(event_id)
    );

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(selected) => {
                        let Ok(text) = serde_json::to_string(&selected) else {
                            continue;
                        };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Отстал — пропущенное доберёт опросом, продолжаем
                    // со свежих сообщений.
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("websocket observer lagged, {} messages dropped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Входящие данные игнорируем, канал односторонний;
                    // ping/pong axum отвечает сам.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("websocket observer left event {}", event_id);
}
