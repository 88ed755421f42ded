//! gateway.rs
//!
//! Сервисный слой для внешнего платёжного шлюза.
//!
//! Ядро не проверяет подлинность платежей — шлюз для него внешний
//! коллаборатор: здесь только создание заказа (редирект покупателя на
//! оплату) и best-effort возврат. Все сетевые вызовы защищены
//! "Автоматическим выключателем" (Circuit Breaker), чтобы недоступный
//! шлюз не съедал воркеры постоянными таймаутами.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::PaymentConfig;

const FAILURE_THRESHOLD: u32 = 5;
const OPEN_TIMEOUT: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Состояния выключателя: Closed — запросы идут, Open — блокируются,
/// HalfOpen — разрешён один пробный запрос после таймаута.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    open_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
            }),
            failure_threshold,
            open_timeout,
        }
    }

    /// Пропустить ли следующий запрос. В Open после таймаута переходит
    /// в HalfOpen и разрешает один пробный.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!("payment gateway circuit breaker: Open -> HalfOpen");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        if inner.state == CircuitState::HalfOpen {
            info!("payment gateway circuit breaker recovered: HalfOpen -> Closed");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        "payment gateway circuit breaker OPENED after {} failures",
                        inner.failures
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("payment gateway circuit breaker test failed: HalfOpen -> Open");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock").state
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway temporarily unavailable (circuit breaker open)")]
    CircuitOpen,
    #[error("payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment gateway returned status {0}")]
    Api(u16),
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    amount: i64,
    currency: String,
    capture_mode: String,
    merchant_order_ext_ref: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_email: Option<String>,
    success_redirect_url: String,
    failure_redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    #[serde(default)]
    redirect_url: Option<String>,
}

/// Созданный в шлюзе заказ; `payment_id` становится payment_reference кредита.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub payment_id: String,
    pub redirect_url: Option<String>,
}

/// Клиент платёжного шлюза.
#[derive(Clone)]
pub struct PaymentGatewayClient {
    base_url: String,
    api_key: String,
    success_url: String,
    fail_url: String,
    http_client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl PaymentGatewayClient {
    pub fn from_config(config: &PaymentConfig) -> Self {
        Self {
            base_url: config.gateway_url.clone(),
            api_key: config.api_key.clone(),
            success_url: config.success_url.clone(),
            fail_url: config.fail_url.clone(),
            http_client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
            circuit_breaker: Arc::new(CircuitBreaker::new(FAILURE_THRESHOLD, OPEN_TIMEOUT)),
        }
    }

    /// Без настоящего ключа работаем в мок-режиме (локальная разработка).
    fn is_mock_mode(&self) -> bool {
        self.api_key.contains("placeholder")
    }

    async fn execute<F, T>(&self, operation: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        if !self.circuit_breaker.can_execute() {
            warn!("circuit breaker is OPEN - blocking payment gateway request");
            return Err(GatewayError::CircuitOpen);
        }

        match operation.await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                Err(GatewayError::Http(e))
            }
        }
    }

    /// Создаёт заказ в шлюзе, возвращает id платежа и URL редиректа.
    pub async fn create_order(
        &self,
        amount: f64,
        currency: &str,
        description: &str,
        customer_email: Option<&str>,
        ext_ref: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        if self.is_mock_mode() {
            warn!("using mock payment gateway order (no real API key configured)");
            return Ok(GatewayOrder {
                payment_id: format!("mock_{}", uuid::Uuid::new_v4()),
                redirect_url: Some(format!("{}?mock=1", self.success_url)),
            });
        }

        let request = CreateOrderRequest {
            amount: (amount * 100.0).round() as i64,
            currency: currency.to_string(),
            capture_mode: "AUTOMATIC".to_string(),
            merchant_order_ext_ref: ext_ref.to_string(),
            description: description.to_string(),
            customer_email: customer_email.map(str::to_string),
            success_redirect_url: self.success_url.clone(),
            failure_redirect_url: self.fail_url.clone(),
        };

        info!("creating gateway order: amount={} {}", amount, currency);

        let url = format!("{}/pay", self.base_url);
        let http_client = self.http_client.clone();
        let api_key = self.api_key.clone();

        let response = self
            .execute(async move {
                http_client
                    .post(&url)
                    .bearer_auth(api_key)
                    .json(&request)
                    .send()
                    .await
            })
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Api(response.status().as_u16()));
        }

        let body: CreateOrderResponse = response.json().await.map_err(GatewayError::Http)?;
        Ok(GatewayOrder {
            payment_id: body.id,
            redirect_url: body.redirect_url,
        })
    }

    /// Best-effort возврат средств; ошибка не фатальна для вызывающего.
    pub async fn refund_order(&self, payment_id: &str, reason: &str) -> Result<bool, GatewayError> {
        if self.is_mock_mode() {
            info!("mock gateway refund for {}", payment_id);
            return Ok(true);
        }

        let url = format!("{}/orders/{}/refund", self.base_url, payment_id);
        let http_client = self.http_client.clone();
        let api_key = self.api_key.clone();
        let body = serde_json::json!({ "reason": reason });

        let response = self
            .execute(async move {
                http_client
                    .post(&url)
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await
            })
            .await?;

        Ok(response.status().is_success())
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(cb.can_execute());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn breaker_half_open_after_timeout_then_closes_on_success() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(0));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // Нулевой таймаут: следующий запрос сразу пробный.
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn breaker_failed_probe_reopens() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(0));
        cb.record_failure();
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
