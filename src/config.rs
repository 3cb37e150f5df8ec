use std::env;

use log::*;
use thiserror::Error;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("SESSION_SECRET must be set")]
    MissingSessionSecret,
    #[error("SESSION_SECRET must be at least {} bytes long", MIN_SECRET_LEN)]
    ShortSessionSecret,
    #[error("Invalid {key} value: {value}")]
    Invalid { key: String, value: String },
}

/**
 * Runtime configuration, read from the environment (and `.env` through dotenv)
 */
#[derive(Clone, Debug)]
pub struct Config {
    /**
     * The in-memory store is used when this is unset
     */
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub listen_addr: String,
    pub session_secret: String,
    /**
     * `name:password` pairs for the built-in identity provider
     */
    pub users: String,
    /**
     * The question creation API stays disabled without it
     */
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let session_secret = var("SESSION_SECRET").ok_or(ConfigError::MissingSessionSecret)?;
        if session_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::ShortSessionSecret);
        }

        let max_connections = match var("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "DATABASE_MAX_CONNECTIONS".to_string(),
                value,
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let listen_addr = var("LISTEN_ADDR").unwrap_or_else(|| {
            info!("LISTEN_ADDR not set, using default: {}", DEFAULT_LISTEN_ADDR);
            DEFAULT_LISTEN_ADDR.to_string()
        });

        Ok(Self {
            database_url: var("DATABASE_URL"),
            max_connections,
            listen_addr,
            session_secret,
            users: var("POLLS_USERS").unwrap_or_default(),
            admin_token: var("POLLS_ADMIN_TOKEN"),
        })
    }
}
