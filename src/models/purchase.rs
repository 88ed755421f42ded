use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Алфавит кода подтверждения: заглавные буквы и цифры без
/// легко путаемых символов (I, O, 0, 1).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

/// Запись о состоявшейся аллокации: ровно один квадрат, ровно один кредит.
/// Создаётся только как финальный эффект успешной аллокации и неизменяема.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SquarePurchase {
    pub id: Uuid,
    pub square_id: Uuid,
    pub credit_id: Uuid,
    pub customer_name_initials: String,
    pub customer_full_name: String,
    pub confirmation_code: String,
    pub created_at: DateTime<Utc>,
}

/// Шестисимвольный код подтверждения, показываемый покупателю.
pub fn generate_confirmation_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Инициалы для отображения на сетке, максимум три.
pub fn name_initials(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .map(|c| c.to_ascii_uppercase())
        .take(3)
        .collect()
}
