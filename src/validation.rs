//! validation.rs
//!
//! Декларативная валидация входных полей: набор правил задаётся
//! тегированными вариантами `FieldRule` и проверяется универсальной
//! функцией `validate_fields`. Все нарушения собираются в одну
//! `AppError::Validation`, чтобы клиент увидел полный список сразу.

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy)]
pub enum FieldRule {
    Required,
    MinLen(usize),
    MaxLen(usize),
    Email,
    Phone,
}

/// Проверяет одно значение по набору правил, возвращает список нарушений.
fn check_field(name: &str, value: Option<&str>, rules: &[FieldRule]) -> Vec<String> {
    let mut errors = Vec::new();

    let trimmed = value.map(str::trim).filter(|v| !v.is_empty());

    let present = trimmed.is_some();
    if rules.iter().any(|r| matches!(r, FieldRule::Required)) && !present {
        errors.push(format!("{} is required", name));
        return errors;
    }

    // Необязательное пустое поле дальше не проверяем.
    let Some(v) = trimmed else {
        return errors;
    };

    for rule in rules {
        match rule {
            FieldRule::Required => {}
            FieldRule::MinLen(min) => {
                if v.chars().count() < *min {
                    errors.push(format!("{} must be at least {} characters long", name, min));
                }
            }
            FieldRule::MaxLen(max) => {
                if v.chars().count() > *max {
                    errors.push(format!("{} must be no more than {} characters long", name, max));
                }
            }
            FieldRule::Email => {
                if !looks_like_email(v) {
                    errors.push(format!("{} must be a valid email address", name));
                }
            }
            FieldRule::Phone => {
                if !looks_like_phone(v) {
                    errors.push(format!("{} must be a valid phone number", name));
                }
            }
        }
    }

    errors
}

/// Прогоняет все поля через их правила; при нарушениях возвращает
/// одну агрегированную ошибку валидации.
pub fn validate_fields(fields: &[(&str, Option<&str>, &[FieldRule])]) -> AppResult<()> {
    let mut errors = Vec::new();
    for (name, value, rules) in fields {
        errors.extend(check_field(name, *value, rules));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Validation failed: {}",
            errors.join(", ")
        )))
    }
}

/// Для кредита обязателен хотя бы один канал связи с покупателем.
pub fn require_email_or_phone(email: Option<&str>, phone: Option<&str>) -> AppResult<()> {
    let has_email = email.map(str::trim).is_some_and(|v| !v.is_empty());
    let has_phone = phone.map(str::trim).is_some_and(|v| !v.is_empty());

    if !has_email && !has_phone {
        return Err(AppError::Validation(
            "Either email or phone number is required".to_string(),
        ));
    }
    Ok(())
}

fn looks_like_email(v: &str) -> bool {
    if v.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = v.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let Some(domain) = parts.next() else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn looks_like_phone(v: &str) -> bool {
    let rest = v.strip_prefix('+').unwrap_or(v);
    !rest.is_empty()
        && rest.chars().any(|c| c.is_ascii_digit())
        && rest
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use FieldRule::*;

    #[test]
    fn required_field_missing_fails() {
        let err = validate_fields(&[("customerName", None, &[Required])]).unwrap_err();
        assert!(err.to_string().contains("customerName is required"));
    }

    #[test]
    fn optional_empty_field_skips_other_rules() {
        assert!(validate_fields(&[("customerEmail", None, &[Email])]).is_ok());
        assert!(validate_fields(&[("customerEmail", Some("   "), &[Email])]).is_ok());
    }

    #[test]
    fn length_rules_apply() {
        assert!(validate_fields(&[("name", Some("a"), &[MinLen(2)])]).is_err());
        assert!(validate_fields(&[("name", Some("ab"), &[MinLen(2), MaxLen(3)])]).is_ok());
        assert!(validate_fields(&[("name", Some("abcd"), &[MaxLen(3)])]).is_err());
    }

    #[test]
    fn email_rule() {
        assert!(validate_fields(&[("e", Some("mary@example.ie"), &[Email])]).is_ok());
        assert!(validate_fields(&[("e", Some("not-an-email"), &[Email])]).is_err());
        assert!(validate_fields(&[("e", Some("a b@example.ie"), &[Email])]).is_err());
        assert!(validate_fields(&[("e", Some("a@nodot"), &[Email])]).is_err());
    }

    #[test]
    fn phone_rule() {
        assert!(validate_fields(&[("p", Some("+353 85 123 4567"), &[Phone])]).is_ok());
        assert!(validate_fields(&[("p", Some("(01) 555-1234"), &[Phone])]).is_ok());
        assert!(validate_fields(&[("p", Some("call me"), &[Phone])]).is_err());
        assert!(validate_fields(&[("p", Some("+"), &[Phone])]).is_err());
    }

    #[test]
    fn multiple_violations_are_aggregated() {
        let err = validate_fields(&[
            ("customerName", None, &[Required]),
            ("customerEmail", Some("bad"), &[Email]),
        ])
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("customerName is required"));
        assert!(msg.contains("customerEmail must be a valid email address"));
    }

    #[test]
    fn either_email_or_phone() {
        assert!(require_email_or_phone(Some("mary@example.ie"), None).is_ok());
        assert!(require_email_or_phone(None, Some("+3531234567")).is_ok());
        assert!(require_email_or_phone(None, None).is_err());
        assert!(require_email_or_phone(Some("  "), Some("")).is_err());
    }
}
