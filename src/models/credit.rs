use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Платёжный кредит — короткоживущий токен брони, выданный после оплаты.
/// Тратится не более одного раза и только в статусе CONFIRMED до expires_at.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentCredit {
    pub id: Uuid,
    pub event_id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub payment_reference: String,
    pub amount: f64,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PaymentCredit {
    pub fn status(&self) -> Option<CreditStatus> {
        CreditStatus::parse(&self.status)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Может ли кредит прямо сейчас быть потрачен на выбор квадрата.
    pub fn can_select_square(&self, now: DateTime<Utc>) -> bool {
        self.status() == Some(CreditStatus::Confirmed) && !self.is_expired_at(now)
    }

    /// Контакт покупателя, который становится owner_id квадрата.
    pub fn contact(&self) -> Option<&str> {
        self.customer_email
            .as_deref()
            .or(self.customer_phone.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditStatus {
    Pending,
    Confirmed,
    Used,
    Expired,
    Refunded,
}

impl CreditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditStatus::Pending => "PENDING",
            CreditStatus::Confirmed => "CONFIRMED",
            CreditStatus::Used => "USED",
            CreditStatus::Expired => "EXPIRED",
            CreditStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(CreditStatus::Pending),
            "CONFIRMED" => Some(CreditStatus::Confirmed),
            "USED" => Some(CreditStatus::Used),
            "EXPIRED" => Some(CreditStatus::Expired),
            "REFUNDED" => Some(CreditStatus::Refunded),
            _ => None,
        }
    }
}
