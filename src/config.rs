use std::env;

/// Timing constants the queue engine works against.
#[derive(Clone, Debug)]
pub struct QueuePolicy {
    pub expiry_minutes: i64,
    pub grace_minutes: i64,
    /// How long a service may run past its end before reconciliation closes it.
    pub overtime_grace_minutes: i64,
    pub average_service_minutes: i64,
    pub max_service_minutes: i32,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            expiry_minutes: 45,
            grace_minutes: 5,
            overtime_grace_minutes: 10,
            average_service_minutes: 45,
            max_service_minutes: 240,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub staff_token: String,
    pub notify_webhook_url: String,
    pub notify_webhook_secret: String,
    pub policy: QueuePolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = QueuePolicy::default();
        Self {
            port: env_parse("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "chairqueue.db".to_string()),
            staff_token: env::var("STAFF_TOKEN").unwrap_or_default(),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").unwrap_or_default(),
            notify_webhook_secret: env::var("NOTIFY_WEBHOOK_SECRET").unwrap_or_default(),
            policy: QueuePolicy {
                expiry_minutes: env_parse("BOOKING_EXPIRY_MINUTES", defaults.expiry_minutes),
                grace_minutes: env_parse("EXPIRY_GRACE_MINUTES", defaults.grace_minutes),
                overtime_grace_minutes: env_parse(
                    "OVERTIME_GRACE_MINUTES",
                    defaults.overtime_grace_minutes,
                ),
                average_service_minutes: env_parse(
                    "AVERAGE_SERVICE_MINUTES",
                    defaults.average_service_minutes,
                ),
                max_service_minutes: env_parse("MAX_SERVICE_MINUTES", defaults.max_service_minutes),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
