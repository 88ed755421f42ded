use serde::Deserialize;
use std::env;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub game: GameConfig,
    pub payment: PaymentConfig,
    pub rate_limit: RateLimitConfig,
    pub admin: AdminConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки Redis
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

// Настройки игры: размеры сетки, цена квадрата, время жизни кредитов.
// Призовой фонд — внешняя конфигурация, ядро его не вычисляет.
#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    pub grid_cols: u32,
    pub grid_rows: u32,
    pub square_price: f64,
    pub currency: String,
    pub fixed_prize: f64,
    /// TTL кредита для онлайн-оплаты, минуты.
    pub credit_ttl_minutes: i64,
    /// TTL кредита для наличной оплаты, минуты.
    pub cash_credit_ttl_minutes: i64,
}

// Настройки платёжного шлюза
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub gateway_url: String,
    pub api_key: String,
    pub success_url: String,
    pub fail_url: String,
}

// Настройки rate limiter'а для создания кредитов
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

// Настройки админского доступа
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub token: String,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "square_lottery=debug,tower_http=debug".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").expect("REDIS_URL must be set"),
            },
            game: GameConfig {
                grid_cols: env::var("GRID_COLS")
                    .unwrap_or_else(|_| "12".to_string())
                    .parse()
                    .expect("GRID_COLS must be a valid number"),
                grid_rows: env::var("GRID_ROWS")
                    .unwrap_or_else(|_| "12".to_string())
                    .parse()
                    .expect("GRID_ROWS must be a valid number"),
                square_price: env::var("SQUARE_PRICE")
                    .unwrap_or_else(|_| "10.00".to_string())
                    .parse()
                    .expect("SQUARE_PRICE must be a valid number"),
                currency: env::var("CURRENCY").unwrap_or_else(|_| "EUR".to_string()),
                fixed_prize: env::var("FIXED_PRIZE")
                    .unwrap_or_else(|_| "150.00".to_string())
                    .parse()
                    .expect("FIXED_PRIZE must be a valid number"),
                credit_ttl_minutes: env::var("CREDIT_TTL_MINUTES")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .expect("CREDIT_TTL_MINUTES must be a valid number"),
                cash_credit_ttl_minutes: env::var("CASH_CREDIT_TTL_MINUTES")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .expect("CASH_CREDIT_TTL_MINUTES must be a valid number"),
            },
            payment: PaymentConfig {
                gateway_url: env::var("PAYMENT_GATEWAY_URL")
                    .unwrap_or_else(|_| "https://sandbox-merchant.revolut.com/api/1.0".to_string()),
                api_key: env::var("PAYMENT_API_KEY").unwrap_or_else(|_| "placeholder".to_string()),
                success_url: env::var("PAYMENT_SUCCESS_URL")
                    .unwrap_or_else(|_| "http://localhost:5173/payment-success".to_string()),
                fail_url: env::var("PAYMENT_FAIL_URL")
                    .unwrap_or_else(|_| "http://localhost:5173/payment-failed".to_string()),
            },
            rate_limit: RateLimitConfig {
                max_requests: env::var("RATE_LIMIT_MAX_REQUESTS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .expect("RATE_LIMIT_MAX_REQUESTS must be a valid number"),
                window_seconds: env::var("RATE_LIMIT_WINDOW_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("RATE_LIMIT_WINDOW_SECONDS must be a valid number"),
            },
            admin: AdminConfig {
                token: env::var("ADMIN_TOKEN").expect("ADMIN_TOKEN must be set"),
            },
        }
    }
}
