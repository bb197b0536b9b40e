use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::services::i18n::Language;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    // Populated from the .env file
    pub database_path: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub use_secure_cookies: bool,
    pub autosave_interval_secs: u64,
    pub default_language: String,
}

fn required(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| config::ConfigError::Message(format!(
        "FATAL: Environment variable '{}' is not set in your .env file.", name
    )))
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;
        Self::from_process_env()
    }

    /// Builds the config from variables already in the environment.
    pub fn from_process_env() -> Result<Self, config::ConfigError> {
        let database_path = required("DATABASE_PATH")?;
        if Path::new(&database_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        // 128 hex characters (64 bytes).
        let session_secret_key = required("SESSION_SECRET_KEY")?;
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string()
            ));
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let autosave_interval_secs = match env::var("AUTOSAVE_INTERVAL_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => return Err(config::ConfigError::Message(format!(
                    "FATAL: 'AUTOSAVE_INTERVAL_SECS' must be a positive number of seconds, got '{}'.", raw
                ))),
            },
            Err(_) => 30,
        };

        let default_language = env::var("DEFAULT_LANGUAGE").unwrap_or_else(|_| "ko".to_string());
        let default_language = Language::parse(&default_language)
            .ok_or_else(|| config::ConfigError::Message(format!(
                "FATAL: 'DEFAULT_LANGUAGE' must be 'ko' or 'en', got '{}'.", default_language
            )))?;

        let builder = config::Config::builder()
            // Web host/port live in the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("autosave_interval_secs", autosave_interval_secs as i64)?
            .set_override("default_language", default_language.code())?
            .build()?;

        builder.try_deserialize()
    }

    /// SQLite file with users and every flat admin record.
    pub fn users_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("livlog.db")
    }

    /// redb file with published posts, their indices and drafts.
    pub fn posts_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
            .join("posts")
            .join("posts.db")
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    pub fn language(&self) -> Language {
        Language::parse(&self.default_language).unwrap_or(Language::Ko)
    }
}
