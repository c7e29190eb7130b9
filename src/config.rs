use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    /// Postgres connection string; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// How long a tab may stay hidden before the attempt is auto-submitted.
    pub hidden_dwell_secs: i64,
    /// Heartbeat age after which the sweep auto-submits an attempt.
    pub heartbeat_stale_secs: i64,
    pub sweep_interval_secs: u64,
    pub sweep_enabled: bool,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

pub const DEFAULT_HIDDEN_DWELL_SECS: i64 = 5 * 60;
pub const DEFAULT_HEARTBEAT_STALE_SECS: i64 = 2 * 60;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            jwt_secret: get_env("JWT_SECRET")?,
            hidden_dwell_secs: get_env_parse_or("HIDDEN_DWELL_SECS", DEFAULT_HIDDEN_DWELL_SECS)?,
            heartbeat_stale_secs: get_env_parse_or(
                "HEARTBEAT_STALE_SECS",
                DEFAULT_HEARTBEAT_STALE_SECS,
            )?,
            sweep_interval_secs: get_env_parse_or(
                "SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )?,
            sweep_enabled: get_env_parse_or("SWEEP_ENABLED", true)?,
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        })
    }

    /// Settings for in-process use (tests, local tooling): in-memory store, no sweep.
    pub fn local(jwt_secret: &str) -> Self {
        Self {
            server_address: "127.0.0.1:0".to_string(),
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            hidden_dwell_secs: DEFAULT_HIDDEN_DWELL_SECS,
            heartbeat_stale_secs: DEFAULT_HEARTBEAT_STALE_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_enabled: false,
            log_format: LogFormat::Pretty,
        }
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
