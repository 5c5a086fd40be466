use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::aggregate::{RatingScale, DEFAULT_RATING_SCALE_MAX};
use crate::cache::DEFAULT_TTL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub cache_ttl: Duration,
    pub rating_scale: RatingScale,
    pub log_level: String,
    pub log_json: bool,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let database_url = env_optional("DATABASE_URL")
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let max_connections = parse_u32(
            "FEEDBACK_DB_MAX_CONNECTIONS",
            env_or_default("FEEDBACK_DB_MAX_CONNECTIONS", "5"),
        )?;
        let default_ttl = DEFAULT_TTL.as_secs().to_string();
        let cache_ttl = Duration::from_secs(parse_u64(
            "FEEDBACK_CACHE_TTL_SECONDS",
            env_or_default("FEEDBACK_CACHE_TTL_SECONDS", &default_ttl),
        )?);
        let default_scale = DEFAULT_RATING_SCALE_MAX.to_string();
        let rating_scale = parse_rating_scale(
            "FEEDBACK_RATING_SCALE_MAX",
            env_or_default("FEEDBACK_RATING_SCALE_MAX", &default_scale),
        )?;
        let log_level = env_or_default("FEEDBACK_LOG_LEVEL", "info");
        let log_json = env_optional("FEEDBACK_LOG_JSON")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            max_connections,
            cache_ttl,
            rating_scale,
            log_level,
            log_json,
        })
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_rating_scale(field: &'static str, value: String) -> Result<RatingScale, ConfigError> {
    value
        .parse::<f64>()
        .ok()
        .and_then(RatingScale::new)
        .ok_or(ConfigError::InvalidValue { field, value })
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_truthy_values() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" YES "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
    }

    #[test]
    fn parse_rating_scale_rejects_invalid_values() {
        let five = parse_rating_scale("F", "5".to_string()).unwrap();
        assert_eq!(five.max(), 5.0);
        let ten = parse_rating_scale("F", "10".to_string()).unwrap();
        assert_eq!(ten.max(), 10.0);
        assert!(matches!(
            parse_rating_scale("F", "0".to_string()),
            Err(ConfigError::InvalidValue { field: "F", .. })
        ));
        assert!(parse_rating_scale("F", "five".to_string()).is_err());
    }

    #[test]
    fn parse_integers_report_field() {
        assert_eq!(parse_u64("TTL", "3600".to_string()).unwrap(), 3600);
        let err = parse_u32("POOL", "-1".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "invalid value for POOL: -1");
    }
}
