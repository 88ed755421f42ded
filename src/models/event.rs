use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub square_price: f64,
    pub grid_cols: i32,
    pub grid_rows: i32,
    pub winner_square_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn status(&self) -> Option<EventStatus> {
        EventStatus::parse(&self.status)
    }

    pub fn total_squares(&self) -> i64 {
        self.grid_cols as i64 * self.grid_rows as i64
    }
}

/// Жизненный цикл события.
///
/// DRAFT — начальное; COMPLETED и CANCELLED — терминальные.
/// Продажа кредитов и аллокация квадратов разрешены только в SELLING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Draft,
    Selling,
    SoldOut,
    Live,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "DRAFT",
            EventStatus::Selling => "SELLING",
            EventStatus::SoldOut => "SOLD_OUT",
            EventStatus::Live => "LIVE",
            EventStatus::Completed => "COMPLETED",
            EventStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(EventStatus::Draft),
            "SELLING" => Some(EventStatus::Selling),
            "SOLD_OUT" => Some(EventStatus::SoldOut),
            "LIVE" => Some(EventStatus::Live),
            "COMPLETED" => Some(EventStatus::Completed),
            "CANCELLED" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Cancelled)
    }

    /// Таблица допустимых переходов.
    ///
    /// SELLING → COMPLETED достижим и напрямую (объявление победителя
    /// без явного SOLD_OUT).
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (Draft, Selling)
                | (Selling, SoldOut)
                | (Selling, Live)
                | (Selling, Completed)
                | (SoldOut, Live)
                | (SoldOut, Completed)
                | (Live, Completed)
                | (Draft, Cancelled)
                | (Selling, Cancelled)
                | (SoldOut, Cancelled)
                | (Live, Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::EventStatus::*;

    #[test]
    fn draft_only_opens_to_selling_or_cancels() {
        assert!(Draft.can_transition_to(Selling));
        assert!(Draft.can_transition_to(Cancelled));
        assert!(!Draft.can_transition_to(SoldOut));
        assert!(!Draft.can_transition_to(Completed));
        assert!(!Draft.can_transition_to(Live));
    }

    #[test]
    fn selling_completes_directly_without_sold_out() {
        assert!(Selling.can_transition_to(Completed));
        assert!(Selling.can_transition_to(SoldOut));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for next in [Draft, Selling, SoldOut, Live, Completed, Cancelled] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
        assert!(Completed.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Selling.is_terminal());
    }

    #[test]
    fn round_trips_through_text() {
        for s in [Draft, Selling, SoldOut, Live, Completed, Cancelled] {
            assert_eq!(super::EventStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(super::EventStatus::parse("selling"), None);
    }
}
