//! realtime.rs
//!
//! Рассылка уведомлений об успешных аллокациях всем подключённым
//! наблюдателям события. Доставка best-effort, не более одного раза на
//! соединение: без персистентности, без повторов, без подтверждений.
//! Отставший или отключившийся клиент теряет сообщения и сверяется
//! опросом `GET /api/events/{id}/squares` — это осознанный резервный
//! путь консистентности, а не ошибка.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Ёмкость канала на событие. При переполнении старые сообщения
/// вытесняются — отставшие подписчики добирают состояние опросом.
const CHANNEL_CAPACITY: usize = 256;

/// Полезная нагрузка уведомления о занятом квадрате.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SquareSelected {
    pub event_id: Uuid,
    pub square_id: Uuid,
    pub square_number: i32,
    pub owner_initials: String,
    pub selected_at: DateTime<Utc>,
}

/// Широковещательный узел: канал на каждое событие, создаётся лениво.
///
/// Создаётся один раз при старте процесса и передаётся через `AppState`,
/// а не через глобальную переменную.
pub struct Broadcaster {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<SquareSelected>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Подписка наблюдателя на событие.
    pub fn subscribe(&self, event_id: Uuid) -> broadcast::Receiver<SquareSelected> {
        if let Some(tx) = self.channels.read().expect("broadcaster lock").get(&event_id) {
            return tx.subscribe();
        }

        let mut channels = self.channels.write().expect("broadcaster lock");
        channels
            .entry(event_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Публикация аллокации. Возвращает число получателей;
    /// отсутствие подписчиков — не ошибка.
    pub fn publish(&self, msg: SquareSelected) -> usize {
        let channels = self.channels.read().expect("broadcaster lock");
        match channels.get(&msg.event_id) {
            Some(tx) => tx.send(msg).unwrap_or(0),
            None => 0,
        }
    }

    /// Число активных подписчиков события, для мониторинга.
    pub fn observer_count(&self, event_id: Uuid) -> usize {
        self.channels
            .read()
            .expect("broadcaster lock")
            .get(&event_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
