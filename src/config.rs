use std::env;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("You need to add the {0} to the env")]
    Missing(&'static str),
    #[error("{name} is not valid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub mongodb_uri: String,
    pub database: String,
    pub auth_secret: String,
    pub host: String,
    pub port: u16,
    /// Minutes of inactivity after which a session's state is dropped.
    pub session_idle_minutes: u32,
    pub max_sessions: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        Ok(Self {
            mongodb_uri: required("MONGODB_URI")?,
            database: lookup("MONGODB_DATABASE").unwrap_or_else(|| "ExpenseManager".to_owned()),
            auth_secret: required("AUTH_SECRET")?,
            host: lookup("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: numeric(&lookup, "PORT", 8080)?,
            session_idle_minutes: numeric(&lookup, "SESSION_IDLE_MINUTES", 30)?,
            max_sessions: numeric(&lookup, "MAX_SESSIONS", 10_000)?,
        })
    }
}

fn numeric<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
