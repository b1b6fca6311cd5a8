use chrono::FixedOffset;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Runtime configuration, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub classifier_timeout: Duration,
    pub evaluation_timeout: Duration,
    pub property_concurrency: usize,
    pub farm_offset: FixedOffset,
    pub metrics_addr: SocketAddr,
    pub run_migrations: bool,
    pub run_once: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let gemini_api_key = env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        let gemini_model =
            env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());

        let offset_hours: i32 = parse_or("FARM_UTC_OFFSET_HOURS", 0)?;
        let farm_offset = FixedOffset::east_opt(offset_hours * 3600).ok_or(ConfigError::Invalid {
            key: "FARM_UTC_OFFSET_HOURS",
            value: offset_hours.to_string(),
        })?;

        let property_concurrency: usize = parse_or("PROPERTY_CONCURRENCY", 4)?;
        if property_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "PROPERTY_CONCURRENCY",
                value: "0".into(),
            });
        }

        Ok(Self {
            database_url,
            gemini_api_key,
            gemini_model,
            classifier_timeout: Duration::from_millis(parse_or("CLASSIFIER_TIMEOUT_MS", 3_000)?),
            evaluation_timeout: Duration::from_secs(parse_or("EVALUATION_TIMEOUT_SECS", 300)?),
            property_concurrency,
            farm_offset,
            metrics_addr: parse_or("METRICS_ADDR", SocketAddr::from(([0, 0, 0, 0], 9091)))?,
            run_migrations: parse_flag("RUN_MIGRATIONS", true),
            run_once: parse_flag("RUN_ONCE", false),
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}
