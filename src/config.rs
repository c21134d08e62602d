use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: Option<String>,
    pub exam_api_base_url: String,
    pub exam_api_token: Option<String>,
    pub submit_max_attempts: u32,
    pub submit_retry_backoff_ms: u64,
    pub staging_retention_hours: i64,
    pub bucket_layouts_file: Option<String>,
    pub json_logs: bool,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env_opt("DATABASE_URL"),
            exam_api_base_url: get_env("EXAM_API_BASE_URL")?,
            exam_api_token: get_env_opt("EXAM_API_TOKEN"),
            submit_max_attempts: get_env_parse_or("SUBMIT_MAX_ATTEMPTS", 3)?,
            submit_retry_backoff_ms: get_env_parse_or("SUBMIT_RETRY_BACKOFF_MS", 500)?,
            staging_retention_hours: get_env_parse_or("STAGING_RETENTION_HOURS", 48)?,
            bucket_layouts_file: get_env_opt("BUCKET_LAYOUTS_FILE"),
            json_logs: get_env_opt("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.submit_retry_backoff_ms)
    }

    pub fn staging_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.staging_retention_hours)
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_opt(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
