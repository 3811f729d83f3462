//! Runtime configuration read from the environment.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://students.db";
pub const DEFAULT_MODEL_PATH: &str = "models/student_model.json";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {field}: expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub max_connections: u32,
    pub model_path: PathBuf,
    pub bcrypt_cost: u32,
    pub session_cookie_secure: bool,
    pub admin_username: String,
    pub admin_password: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            session_cookie_secure: false,
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            log_format: LogFormat::Plain,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, so tests don't have to
    /// touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str, default: String| lookup(key).unwrap_or(default);

        let max_connections = parse_value(
            "max_connections",
            &get("DB_MAX_CONNECTIONS", defaults.max_connections.to_string()),
            "a positive integer",
        )?;
        let bcrypt_cost = parse_value(
            "bcrypt_cost",
            &get("BCRYPT_COST", defaults.bcrypt_cost.to_string()),
            "an integer between 4 and 31",
        )?;
        let session_cookie_secure = parse_value(
            "session_cookie_secure",
            &get("SESSION_COOKIE_SECURE", "false".to_string()),
            "true or false",
        )?;
        let log_format = parse_value(
            "log_format",
            &get("LOG_FORMAT", "plain".to_string()),
            "plain, pretty or json",
        )?;

        let config = Config {
            bind_addr: get("BIND_ADDR", defaults.bind_addr),
            database_url: get("DATABASE_URL", defaults.database_url),
            max_connections,
            model_path: PathBuf::from(get(
                "MODEL_PATH",
                defaults.model_path.to_string_lossy().into_owned(),
            )),
            bcrypt_cost,
            session_cookie_secure,
            admin_username: get("ADMIN_USERNAME", defaults.admin_username),
            admin_password: get("ADMIN_PASSWORD", defaults.admin_password),
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "DB_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::ValidationFailed(
                "BCRYPT_COST must be between 4 and 31".to_string(),
            ));
        }
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "DATABASE_URL must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(
    field: &str,
    raw: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        expected: expected.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!(config.log_format, LogFormat::Plain);
        assert!(!config.session_cookie_secure);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DB_MAX_CONNECTIONS", "2"),
            ("BCRYPT_COST", "4"),
            ("SESSION_COOKIE_SECURE", "true"),
            ("LOG_FORMAT", "JSON"),
            ("MODEL_PATH", "/tmp/model.json"),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.bcrypt_cost, 4);
        assert!(config.session_cookie_secure);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.model_path, PathBuf::from("/tmp/model.json"));
    }

    #[test]
    fn invalid_number_names_the_field() {
        let err = Config::from_lookup(lookup(&[("DB_MAX_CONNECTIONS", "many")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { field, value, .. } => {
                assert_eq!(field, "max_connections");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn out_of_range_cost_fails_validation() {
        let err = Config::from_lookup(lookup(&[("BCRYPT_COST", "2")])).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));
    }
}
