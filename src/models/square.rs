use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Square {
    pub id: Uuid,
    pub event_id: Uuid,
    pub grid_x: i32,
    pub grid_y: i32,
    pub square_number: i32,
    pub position: String,
    pub status: String,
    pub owner_id: Option<String>,
    pub selected_at: Option<DateTime<Utc>>,
}

impl Square {
    pub fn status(&self) -> Option<SquareStatus> {
        SquareStatus::parse(&self.status)
    }
}

/// Статус квадрата. Переход AVAILABLE → TAKEN однонаправленный:
/// повторная аллокация занятого квадрата обязана провалиться.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquareStatus {
    Available,
    Taken,
    Reserved,
}

impl SquareStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SquareStatus::Available => "AVAILABLE",
            SquareStatus::Taken => "TAKEN",
            SquareStatus::Reserved => "RESERVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(SquareStatus::Available),
            "TAKEN" => Some(SquareStatus::Taken),
            "RESERVED" => Some(SquareStatus::Reserved),
            _ => None,
        }
    }
}
