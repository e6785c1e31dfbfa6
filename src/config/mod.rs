//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! unparseable. Sensitive values wrapped in secrecy::SecretString to
//! prevent log leaks.

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const DEFAULT_TODO_QUEUE: &str = "todo_postcode";
pub const DEFAULT_DONE_QUEUE: &str = "done_postcode";

#[derive(Debug)]
pub struct Config {
    /// Postgres URL of the pgmq broker.
    pub database_url: SecretString,
    /// Only the worker needs this; see [`Config::require_api_key`].
    pub geocode_api_key: Option<SecretString>,
    pub geocode_url: String,
    pub todo_queue: String,
    pub done_queue: String,
    pub visibility_timeout_secs: i32,
    pub pacing: Duration,
    pub poll_interval: Duration,
    pub lookup_timeout: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            geocode_api_key: std::env::var("GEOCODE_API_KEY").ok().map(SecretString::from),
            geocode_url: std::env::var("GEOCODE_URL")
                .unwrap_or_else(|_| DEFAULT_GEOCODE_URL.to_string()),
            todo_queue: std::env::var("TODO_QUEUE")
                .unwrap_or_else(|_| DEFAULT_TODO_QUEUE.to_string()),
            done_queue: std::env::var("DONE_QUEUE")
                .unwrap_or_else(|_| DEFAULT_DONE_QUEUE.to_string()),
            visibility_timeout_secs: visibility_timeout()?,
            pacing: Duration::from_millis(parsed_var("PACING_MS", 200)?),
            poll_interval: Duration::from_millis(parsed_var("POLL_INTERVAL_MS", 1000)?),
            lookup_timeout: Duration::from_secs(parsed_var("LOOKUP_TIMEOUT_SECS", 10)?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// The geocoding API key, or a config error if it was not provided.
    pub fn require_api_key(&self) -> Result<&SecretString> {
        self.geocode_api_key.as_ref().ok_or_else(|| {
            Error::Config("required environment variable GEOCODE_API_KEY is not set".to_string())
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// A read must hide the message for at least a second, or a second
/// consumer could take the same job while the first still holds it.
fn visibility_timeout() -> Result<i32> {
    let secs: i32 = parsed_var("VISIBILITY_TIMEOUT_SECS", 60)?;
    if secs < 1 {
        return Err(Error::Config(format!(
            "VISIBILITY_TIMEOUT_SECS must be at least 1, got {secs}"
        )));
    }
    Ok(secs)
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid value for {name} ({raw:?}): {e}"))),
        Err(_) => Ok(default),
    }
}
