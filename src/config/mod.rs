use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Which dispatch strategy fires alarms.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub enum NotifierKind {
    Log,
    Webhook,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub access_token_expiration_secs: i64,
    pub refresh_token_expiration_secs: i64,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub allowed_origins: Vec<String>,
    pub google_userinfo_url: String,
    pub outbound_timeout_secs: u64,
    pub dispatch_workers: usize,
    pub dispatch_timeout_secs: u64,
    pub notifier: NotifierKind,
    pub push_webhook_url: Option<String>,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

const MAX_ACCESS_TOKEN_MINUTES: i64 = 24 * 60;
const MAX_REFRESH_TOKEN_DAYS: i64 = 365;

/// Converts a token lifetime setting to seconds, rejecting values outside `1..=max`.
fn lifetime_secs(
    name: &'static str,
    value: i64,
    max: i64,
    unit_secs: i64,
) -> Result<i64, ConfigError> {
    if !(1..=max).contains(&value) {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        });
    }
    Ok(value * unit_secs)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // Token lifetimes
        let access_token_expiration_secs = lifetime_secs(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            parsed_or("ACCESS_TOKEN_EXPIRE_MINUTES", 30)?,
            MAX_ACCESS_TOKEN_MINUTES,
            60,
        )?;
        let refresh_token_expiration_secs = lifetime_secs(
            "REFRESH_TOKEN_EXPIRE_DAYS",
            parsed_or("REFRESH_TOKEN_EXPIRE_DAYS", 7)?,
            MAX_REFRESH_TOKEN_DAYS,
            24 * 3600,
        )?;

        // Alarm dispatch strategy

        let notifier = match env::var("NOTIFIER")
            .unwrap_or_else(|_| "log".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "log" => NotifierKind::Log,
            "webhook" => NotifierKind::Webhook,
            other => {
                return Err(ConfigError::Invalid {
                    name: "NOTIFIER",
                    value: other.to_string(),
                });
            }
        };
        let push_webhook_url = env::var("PUSH_WEBHOOK_URL").ok();
        if notifier == NotifierKind::Webhook && push_webhook_url.is_none() {
            return Err(ConfigError::Missing("PUSH_WEBHOOK_URL"));
        }

        // Comma separated; only used by release builds
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 10)?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_expiration_secs,
            refresh_token_expiration_secs,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: parsed_or("SERVER_PORT", 8002)?,
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            allowed_origins,
            google_userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v2/userinfo".into()),
            outbound_timeout_secs: parsed_or("OUTBOUND_TIMEOUT_SECS", 10)?,
            dispatch_workers: parsed_or("DISPATCH_WORKERS", 8)?,
            dispatch_timeout_secs: parsed_or("DISPATCH_TIMEOUT_SECS", 10)?,
            notifier,
            push_webhook_url,
        })
    }

    pub fn access_token_expiration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_expiration_secs)
    }

    pub fn refresh_token_expiration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_token_expiration_secs)
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_secs(self.outbound_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    /// Settings for tests and local tooling; nothing is read from the environment.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Config {
            database_url: "postgres://localhost/otters_test".into(),
            db_max_connections: 1,
            jwt_secret: jwt_secret.to_string(),
            access_token_expiration_secs: 30 * 60,
            refresh_token_expiration_secs: 7 * 24 * 3600,
            server_host: "127.0.0.1".into(),
            server_port: 0,
            api_base_uri: "/api".into(),
            allowed_origins: vec!["http://localhost:3000".into()],
            google_userinfo_url: "http://127.0.0.1:9/userinfo".into(),
            outbound_timeout_secs: 1,
            dispatch_workers: 2,
            dispatch_timeout_secs: 1,
            notifier: NotifierKind::Log,
            push_webhook_url: None,
        }
    }
}
