use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    /// Clinic REST backend (auth, appointments, billing, clinics, reports).
    pub backend_url: String,
    /// AI document-chat service, a separate host.
    pub chatbot_url: String,
    /// When set, sessions are persisted in Postgres instead of memory.
    pub database_url: Option<String>,
    pub session_ttl_hours: i64,
    pub toast_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let backend_url =
            env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let chatbot_url =
            env::var("CHATBOT_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());

        let session_ttl_hours = match env::var("SESSION_TTL_HOURS") {
            Ok(raw) => parse_positive("SESSION_TTL_HOURS", &raw)?,
            Err(_) => 24,
        };

        let toast_ttl_ms = match env::var("TOAST_TTL_MS") {
            Ok(raw) => parse_positive("TOAST_TTL_MS", &raw)?,
            Err(_) => 2500,
        };

        Ok(Self {
            bind_addr,
            backend_url,
            chatbot_url,
            database_url,
            session_ttl_hours,
            toast_ttl: Duration::from_millis(toast_ttl_ms as u64),
        })
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<i64, ConfigError> {
    match raw.trim().parse::<i64>() {
        Ok(v) if v > 0 => Ok(v),
        Ok(v) => Err(ConfigError::InvalidValue(var, format!("{v} must be > 0"))),
        Err(e) => Err(ConfigError::InvalidValue(var, e.to_string())),
    }
}
