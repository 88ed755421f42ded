//! Интеграционные тесты движка аллокации против настоящих Postgres и Redis.
//!
//! Запускаются только при заданных DATABASE_URL и REDIS_URL, иначе
//! каждый тест молча пропускается: корректность гонок проверяема только
//! на настоящей БД с настоящими блокировками.

use std::sync::Arc;
use uuid::Uuid;

use square_lottery::config::{
    AdminConfig, AppConfig, Config, DatabaseConfig, GameConfig, PaymentConfig, RateLimitConfig,
    RedisConfig,
};
use square_lottery::errors::AppError;
use square_lottery::middleware::RateLimiter;
use square_lottery::models::credit::PaymentCredit;
use square_lottery::models::square::Square;
use square_lottery::services::allocation::AllocationEngine;
use square_lottery::services::cleanup::ExpirySweeper;
use square_lottery::services::events::EventService;
use square_lottery::services::ledger::{CreditLedger, NewCredit, PaymentChannel};
use square_lottery::AppState;

async fn test_state() -> Option<Arc<AppState>> {
    let db_url = std::env::var("DATABASE_URL").ok()?;
    let redis_url = std::env::var("REDIS_URL").ok()?;

    let config = Config {
        app: AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            rust_log: "warn".to_string(),
        },
        database: DatabaseConfig {
            url: db_url,
            pool_size: 10,
        },
        redis: RedisConfig { url: redis_url },
        game: GameConfig {
            grid_cols: 12,
            grid_rows: 12,
            square_price: 10.0,
            currency: "EUR".to_string(),
            fixed_prize: 150.0,
            credit_ttl_minutes: 15,
            cash_credit_ttl_minutes: 30,
        },
        payment: PaymentConfig {
            gateway_url: "http://127.0.0.1:1".to_string(),
            api_key: "placeholder".to_string(),
            success_url: "http://localhost/ok".to_string(),
            fail_url: "http://localhost/fail".to_string(),
        },
        rate_limit: RateLimitConfig {
            max_requests: 1000,
            window_seconds: 60,
        },
        admin: AdminConfig {
            token: "test-admin-token".to_string(),
        },
    };

    AppState::new(config).await.ok()
}

macro_rules! require_state {
    () => {
        match test_state().await {
            Some(state) => state,
            None => {
                eprintln!("skipping: DATABASE_URL/REDIS_URL not set");
                return;
            }
        }
    };
}

/// Событие в SELLING с маленькой сеткой, чтобы тесты были дешёвыми.
async fn selling_event(state: &Arc<AppState>, cols: u32, rows: u32) -> Uuid {
    let service = EventService::new(state.clone());
    let event = service
        .create_event(
            &format!("test event {}", Uuid::new_v4()),
            None,
            Some(cols),
            Some(rows),
        )
        .await
        .unwrap();
    service.open_selling(event.id).await.unwrap();
    event.id
}

async fn cash_credit(state: &Arc<AppState>, event_id: Uuid) -> PaymentCredit {
    CreditLedger::new(state.clone())
        .create_credit(
            PaymentChannel::Cash,
            NewCredit {
                event_id,
                customer_name: "Mary Byrne".to_string(),
                customer_email: Some("mary@example.ie".to_string()),
                customer_phone: None,
                amount: 10.0,
                payment_reference: None,
            },
        )
        .await
        .unwrap()
}

async fn event_squares(state: &Arc<AppState>, event_id: Uuid) -> Vec<Square> {
    sqlx::query_as::<_, Square>(
        "SELECT * FROM squares WHERE event_id = $1 ORDER BY square_number",
    )
    .bind(event_id)
    .fetch_all(&state.db.pool)
    .await
    .unwrap()
}

async fn force_expired(state: &Arc<AppState>, credit_id: Uuid) {
    sqlx::query("UPDATE payment_credits SET expires_at = NOW() - INTERVAL '1 minute' WHERE id = $1")
        .bind(credit_id)
        .execute(&state.db.pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn happy_path_allocation_produces_purchase_and_spends_credit() {
    let state = require_state!();
    let event_id = selling_event(&state, 3, 3).await;
    let credit = cash_credit(&state, event_id).await;
    let squares = event_squares(&state, event_id).await;

    let outcome = AllocationEngine::new(state.clone())
        .allocate(credit.id, squares[0].id)
        .await
        .unwrap();

    assert_eq!(outcome.square_number, 1);
    assert_eq!(outcome.position, "A1");
    assert_eq!(outcome.owner_initials, "MB");
    assert_eq!(outcome.confirmation_code.len(), 6);
    assert!(!outcome.sold_out);

    let credit = CreditLedger::new(state.clone()).get_credit(credit.id).await.unwrap();
    assert_eq!(credit.status, "USED");

    let squares = event_squares(&state, event_id).await;
    assert_eq!(squares[0].status, "TAKEN");
    assert_eq!(squares[0].owner_id.as_deref(), Some("mary@example.ie"));
    assert!(squares[0].selected_at.is_some());
}

#[tokio::test]
async fn one_credit_buys_exactly_one_square_under_contention() {
    let state = require_state!();
    let event_id = selling_event(&state, 3, 3).await;
    let credit = cash_credit(&state, event_id).await;
    let squares = event_squares(&state, event_id).await;

    // Один кредит, восемь конкурирующих попыток на разные квадраты.
    let mut tasks = Vec::new();
    for square in squares.iter().take(8) {
        let engine = AllocationEngine::new(state.clone());
        let credit_id = credit.id;
        let square_id = square.id;
        tasks.push(tokio::spawn(async move {
            engine.allocate(credit_id, square_id).await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);

    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM squares WHERE event_id = $1 AND status = 'TAKEN'",
    )
    .bind(event_id)
    .fetch_one(&state.db.pool)
    .await
    .unwrap();
    assert_eq!(taken, 1);
}

#[tokio::test]
async fn one_square_goes_to_exactly_one_credit_under_contention() {
    let state = require_state!();
    let event_id = selling_event(&state, 3, 3).await;
    let squares = event_squares(&state, event_id).await;
    let target = squares[4].id;

    let mut credits = Vec::new();
    for _ in 0..6 {
        credits.push(cash_credit(&state, event_id).await);
    }

    let mut tasks = Vec::new();
    for credit in &credits {
        let engine = AllocationEngine::new(state.clone());
        let credit_id = credit.id;
        tasks.push(tokio::spawn(
            async move { engine.allocate(credit_id, target).await },
        ));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 5);

    // Проигравшие кредиты остаются CONFIRMED и могут купить другой квадрат.
    let ledger = CreditLedger::new(state.clone());
    let mut confirmed = 0;
    for credit in &credits {
        let c = ledger.get_credit(credit.id).await.unwrap();
        if c.status == "CONFIRMED" {
            confirmed += 1;
        }
    }
    assert_eq!(confirmed, 5);
}

#[tokio::test]
async fn double_spend_of_used_credit_is_a_conflict() {
    let state = require_state!();
    let event_id = selling_event(&state, 2, 2).await;
    let credit = cash_credit(&state, event_id).await;
    let squares = event_squares(&state, event_id).await;

    let engine = AllocationEngine::new(state.clone());
    engine.allocate(credit.id, squares[0].id).await.unwrap();

    let err = engine.allocate(credit.id, squares[1].id).await.unwrap_err();
    match err {
        AppError::Conflict(msg) => assert!(msg.contains("credit already used")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn expired_credit_is_rejected_and_flipped_to_expired() {
    let state = require_state!();
    let event_id = selling_event(&state, 2, 2).await;
    let credit = cash_credit(&state, event_id).await;
    let squares = event_squares(&state, event_id).await;

    force_expired(&state, credit.id).await;

    let err = AllocationEngine::new(state.clone())
        .allocate(credit.id, squares[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Expired(_)));

    // Экспирация зафиксирована, квадрат остался свободен.
    let credit = CreditLedger::new(state.clone()).get_credit(credit.id).await.unwrap();
    assert_eq!(credit.status, "EXPIRED");
    let squares = event_squares(&state, event_id).await;
    assert_eq!(squares[0].status, "AVAILABLE");
}

#[tokio::test]
async fn lazy_expiry_on_read_is_idempotent_and_monotonic() {
    let state = require_state!();
    let event_id = selling_event(&state, 2, 2).await;
    let credit = cash_credit(&state, event_id).await;

    force_expired(&state, credit.id).await;

    let ledger = CreditLedger::new(state.clone());
    let first = ledger.get_credit(credit.id).await.unwrap();
    assert_eq!(first.status, "EXPIRED");

    // Повторное чтение ничего не меняет, EXPIRED не воскресает.
    let second = ledger.get_credit(credit.id).await.unwrap();
    assert_eq!(second.status, "EXPIRED");

    // И подтвердить мёртвый кредит тоже нельзя.
    assert!(matches!(
        ledger.confirm_credit(credit.id).await.unwrap_err(),
        AppError::InvalidState(_)
    ));
}

#[tokio::test]
async fn pending_gateway_credit_cannot_buy_until_confirmed() {
    let state = require_state!();
    let event_id = selling_event(&state, 2, 2).await;
    let squares = event_squares(&state, event_id).await;

    let ledger = CreditLedger::new(state.clone());
    let credit = ledger
        .create_credit(
            PaymentChannel::Gateway,
            NewCredit {
                event_id,
                customer_name: "Sean Murphy".to_string(),
                customer_email: None,
                customer_phone: Some("+353851234567".to_string()),
                amount: 10.0,
                payment_reference: Some(format!("order_{}", Uuid::new_v4())),
            },
        )
        .await
        .unwrap();
    assert_eq!(credit.status, "PENDING");

    let engine = AllocationEngine::new(state.clone());
    let err = engine.allocate(credit.id, squares[0].id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    // Подтверждение по ссылке платежа (путь вебхука) открывает покупку.
    ledger
        .confirm_by_reference(&credit.payment_reference)
        .await
        .unwrap();
    engine.allocate(credit.id, squares[0].id).await.unwrap();
}

#[tokio::test]
async fn allocation_requires_selling_event() {
    let state = require_state!();
    let service = EventService::new(state.clone());
    let event = service
        .create_event(&format!("draft {}", Uuid::new_v4()), None, Some(2), Some(2))
        .await
        .unwrap();

    // Кредит нельзя завести, пока событие в DRAFT.
    let err = CreditLedger::new(state.clone())
        .create_credit(
            PaymentChannel::Cash,
            NewCredit {
                event_id: event.id,
                customer_name: "Mary Byrne".to_string(),
                customer_email: Some("mary@example.ie".to_string()),
                customer_phone: None,
                amount: 10.0,
                payment_reference: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    // А купленный в SELLING кредит умирает вместе с отменой события.
    service.open_selling(event.id).await.unwrap();
    let credit = cash_credit(&state, event.id).await;
    service.cancel_event(event.id).await.unwrap();

    let squares = event_squares(&state, event.id).await;
    let err = AllocationEngine::new(state.clone())
        .allocate(credit.id, squares[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn square_from_another_event_is_rejected() {
    let state = require_state!();
    let event_a = selling_event(&state, 2, 2).await;
    let event_b = selling_event(&state, 2, 2).await;

    let credit = cash_credit(&state, event_a).await;
    let foreign = event_squares(&state, event_b).await;

    let err = AllocationEngine::new(state.clone())
        .allocate(credit.id, foreign[0].id)
        .await
        .unwrap_err();
    match err {
        AppError::Validation(msg) => assert!(msg.contains("square/event mismatch")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn last_square_flips_event_to_sold_out() {
    let state = require_state!();
    let event_id = selling_event(&state, 2, 1).await;
    let squares = event_squares(&state, event_id).await;
    assert_eq!(squares.len(), 2);

    let engine = AllocationEngine::new(state.clone());

    let first = cash_credit(&state, event_id).await;
    let outcome = engine.allocate(first.id, squares[0].id).await.unwrap();
    assert!(!outcome.sold_out);

    let second = cash_credit(&state, event_id).await;
    let outcome = engine.allocate(second.id, squares[1].id).await.unwrap();
    assert!(outcome.sold_out);

    let service = EventService::new(state.clone());
    let event = service.get_event(event_id).await.unwrap();
    assert_eq!(event.status, "SOLD_OUT");

    // После SOLD_OUT новые кредиты не продаются.
    let err = CreditLedger::new(state.clone())
        .create_credit(
            PaymentChannel::Cash,
            NewCredit {
                event_id,
                customer_name: "Late Larry".to_string(),
                customer_email: Some("larry@example.ie".to_string()),
                customer_phone: None,
                amount: 10.0,
                payment_reference: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn winner_declaration_completes_event_with_details() {
    let state = require_state!();
    let event_id = selling_event(&state, 2, 1).await;
    let squares = event_squares(&state, event_id).await;

    let engine = AllocationEngine::new(state.clone());
    let service = EventService::new(state.clone());

    // Пустой квадрат победителем быть не может.
    let err = service
        .declare_winner(event_id, squares[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let credit = cash_credit(&state, event_id).await;
    let outcome = engine.allocate(credit.id, squares[0].id).await.unwrap();

    let (event, winner) = service.declare_winner(event_id, squares[0].id).await.unwrap();
    assert_eq!(event.status, "COMPLETED");
    assert_eq!(event.winner_square_id, Some(squares[0].id));
    assert_eq!(winner.owner_initials, "MB");
    assert_eq!(winner.customer_full_name, "Mary Byrne");
    assert_eq!(winner.confirmation_code, outcome.confirmation_code);

    // Терминальное событие: второй победитель невозможен.
    assert!(service.declare_winner(event_id, squares[0].id).await.is_err());
}

#[tokio::test]
async fn completed_event_uniformly_rejects_allocation() {
    let state = require_state!();
    let event_id = selling_event(&state, 2, 2).await;
    let squares = event_squares(&state, event_id).await;

    let winner_credit = cash_credit(&state, event_id).await;
    let late_credit = cash_credit(&state, event_id).await;

    let engine = AllocationEngine::new(state.clone());
    let service = EventService::new(state.clone());

    engine.allocate(winner_credit.id, squares[0].id).await.unwrap();
    service.declare_winner(event_id, squares[0].id).await.unwrap();

    // Событие COMPLETED: живой CONFIRMED-кредит больше ничего не покупает,
    // даже на свободный квадрат.
    let err = engine.allocate(late_credit.id, squares[1].id).await.unwrap_err();
    match err {
        AppError::InvalidState(msg) => assert!(msg.contains("event not selling")),
        other => panic!("unexpected error: {:?}", other),
    }

    let squares = event_squares(&state, event_id).await;
    assert_eq!(squares[1].status, "AVAILABLE");
}

#[tokio::test]
async fn oversized_grid_is_rejected_without_overflow() {
    let state = require_state!();
    let service = EventService::new(state.clone());

    // 65536 * 65536 в u32 переворачивается в 0; граница обязана сработать.
    let err = service
        .create_event(
            &format!("huge {}", Uuid::new_v4()),
            None,
            Some(65_536),
            Some(65_536),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = service
        .create_event(&format!("wide {}", Uuid::new_v4()), None, Some(101), Some(100))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn sweeper_expires_stale_credits_in_bulk() {
    let state = require_state!();
    let event_id = selling_event(&state, 2, 2).await;

    let stale = cash_credit(&state, event_id).await;
    let fresh = cash_credit(&state, event_id).await;
    force_expired(&state, stale.id).await;

    ExpirySweeper::new(state.clone()).run_once().await;

    let ledger = CreditLedger::new(state.clone());
    assert_eq!(ledger.get_credit(stale.id).await.unwrap().status, "EXPIRED");
    assert_eq!(ledger.get_credit(fresh.id).await.unwrap().status, "CONFIRMED");

    // Повторный проход ничего не ломает.
    ExpirySweeper::new(state.clone()).run_once().await;
    assert_eq!(ledger.get_credit(stale.id).await.unwrap().status, "EXPIRED");
}

#[tokio::test]
async fn rate_limiter_counts_within_a_live_window() {
    let state = require_state!();
    let limiter = RateLimiter::new(state.redis.clone(), 2, 60);
    let client = format!("client-{}", Uuid::new_v4());

    assert!(limiter.allow("test", &client).await);
    assert!(limiter.allow("test", &client).await);
    assert!(!limiter.allow("test", &client).await);

    // Счётчик окна обязан нести TTL: ключ без срока запер бы клиента
    // навсегда.
    let mut conn = state.redis.conn.clone();
    let ttl: i64 = redis::cmd("TTL")
        .arg(format!("rl:test:{}", client))
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(ttl > 0 && ttl <= 60);

    // Другой клиент лимитом не задет.
    let other = format!("client-{}", Uuid::new_v4());
    assert!(limiter.allow("test", &other).await);
}

#[tokio::test]
async fn refund_is_blocked_once_credit_is_used() {
    let state = require_state!();
    let event_id = selling_event(&state, 2, 2).await;
    let credit = cash_credit(&state, event_id).await;
    let squares = event_squares(&state, event_id).await;

    let ledger = CreditLedger::new(state.clone());
    AllocationEngine::new(state.clone())
        .allocate(credit.id, squares[0].id)
        .await
        .unwrap();

    let err = ledger.refund_credit(credit.id).await.unwrap_err();
    match err {
        AppError::Conflict(msg) => assert!(msg.contains("credit already used")),
        other => panic!("unexpected error: {:?}", other),
    }

    // Непотраченный кредит возвращается, и возврат идемпотентен.
    let other = cash_credit(&state, event_id).await;
    assert_eq!(ledger.refund_credit(other.id).await.unwrap().status, "REFUNDED");
    assert_eq!(ledger.refund_credit(other.id).await.unwrap().status, "REFUNDED");
}
