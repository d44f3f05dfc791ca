use std::str::FromStr;

use serde::Deserialize;

/// Where the dispatch throttle keeps its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleBackend {
    /// In-process leaky bucket, shared by the workers of one process.
    Memory,
    /// Redis-backed slot, shared by every process pointed at the same Redis.
    Redis,
}

impl FromStr for ThrottleBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(ThrottleBackend::Memory),
            "redis" => Ok(ThrottleBackend::Redis),
            other => Err(anyhow::anyhow!(
                "DISPATCH_THROTTLE must be 'memory' or 'redis', got '{}'",
                other
            )),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// JWT secret for operator authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Port the API server binds to (default: 3000)
    pub api_port: u16,

    /// Push gateway endpoint. Push delivery is disabled when unset.
    pub push_gateway_url: Option<String>,

    /// Push gateway API key
    pub push_gateway_key: Option<String>,

    /// SMS carrier endpoint. SMS delivery is simulated when unset.
    pub sms_gateway_url: Option<String>,

    /// SMS carrier API key
    pub sms_api_key: Option<String>,

    /// Sender id shown on outgoing SMS
    pub sms_sender_id: String,

    /// Country calling code applied to local phone numbers (default: 233)
    pub sms_country_code: String,

    /// Hard ceiling on recipients per batch (default: 500)
    pub dispatch_batch_ceiling: usize,

    /// Minimum spacing between gateway sends in milliseconds (default: 200)
    pub dispatch_send_interval_ms: u64,

    /// Per-send timeout in seconds (default: 10)
    pub dispatch_send_timeout_secs: u64,

    /// Recipients processed concurrently within one batch (default: 1)
    pub dispatch_concurrency: usize,

    /// Throttle state backend (default: memory)
    pub dispatch_throttle: ThrottleBackend,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 20)?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: parse_env("JWT_EXPIRY_HOURS", 24)?,
            api_port: parse_env("API_PORT", 3000)?,
            push_gateway_url: optional_env("PUSH_GATEWAY_URL"),
            push_gateway_key: optional_env("PUSH_GATEWAY_KEY"),
            sms_gateway_url: optional_env("SMS_GATEWAY_URL"),
            sms_api_key: optional_env("SMS_API_KEY"),
            sms_sender_id: std::env::var("SMS_SENDER_ID").unwrap_or_else(|_| "CIVIC".to_string()),
            sms_country_code: std::env::var("SMS_COUNTRY_CODE")
                .unwrap_or_else(|_| "233".to_string()),
            dispatch_batch_ceiling: parse_env("DISPATCH_BATCH_CEILING", 500)?,
            dispatch_send_interval_ms: parse_env("DISPATCH_SEND_INTERVAL_MS", 200)?,
            dispatch_send_timeout_secs: parse_env("DISPATCH_SEND_TIMEOUT_SECS", 10)?,
            dispatch_concurrency: parse_env("DISPATCH_CONCURRENCY", 1)?,
            dispatch_throttle: parse_env("DISPATCH_THROTTLE", ThrottleBackend::Memory)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the dispatcher unusable.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatch_batch_ceiling == 0 {
            anyhow::bail!("DISPATCH_BATCH_CEILING must be greater than 0");
        }
        if self.dispatch_concurrency == 0 {
            anyhow::bail!("DISPATCH_CONCURRENCY must be greater than 0");
        }
        if self.dispatch_send_timeout_secs == 0 {
            anyhow::bail!("DISPATCH_SEND_TIMEOUT_SECS must be greater than 0");
        }
        if self.sms_country_code.is_empty()
            || !self.sms_country_code.chars().all(|c| c.is_ascii_digit())
        {
            anyhow::bail!("SMS_COUNTRY_CODE must be digits only (e.g. 233)");
        }
        Ok(())
    }
}

/// Read an optional variable, treating an empty value as unset.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse a variable, falling back to `default` when it is unset.
fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
