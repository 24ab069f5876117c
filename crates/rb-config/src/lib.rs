//! # rb-config
//!
//! Layered runtime settings for relay-board.
//!
//! Sources, lowest precedence first:
//! 1. compiled defaults (every field has one)
//! 2. `config/relay-board.{toml,yaml,json}` if present, or the file named by `RB_CONFIG`
//! 3. `RB_`-prefixed environment variables, `__` separating sections
//!    (e.g. `RB_BOARD__COMMENT_TTL_SECS=120`)
//!
//! A `.env` file in the working directory is loaded into the environment first.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config/relay-board";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub board: BoardSettings,
    pub auth: AuthSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Any sqlx SQLite url, e.g. `sqlite://relay-board.db` or `sqlite::memory:`.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://relay-board.db".into(),
            max_connections: 5,
        }
    }
}

/// Lifecycle tunables.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    pub comment_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    pub session_queue_capacity: usize,
    pub auth_timeout_ms: u64,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            comment_ttl_secs: 300,
            cleanup_interval_secs: 60,
            session_queue_capacity: 32,
            auth_timeout_ms: 3_000,
        }
    }
}

impl BoardSettings {
    pub fn comment_ttl(&self) -> Duration {
        Duration::from_secs(self.comment_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AuthSettings {
    /// Remote auth service; used when the binary is built with `auth-remote`.
    pub remote: Option<RemoteAuthSettings>,
    /// Local account table for the `auth-simple` plugin.
    pub accounts: Vec<AccountSettings>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteAuthSettings {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_remote_timeout_ms() -> u64 {
    2_000
}

impl RemoteAuthSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccountSettings {
    pub id: i64,
    pub username: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub banned: bool,
    /// Hex SHA-256 of the bearer token; the plain token is never stored.
    pub token_sha256: String,
}

fn default_role() -> String {
    "user".into()
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads `.env`, the optional config file and the `RB_` environment.
    pub fn load() -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let path = std::env::var("RB_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let config = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(environment())
            .build()?;

        Self::from_config(config)
    }

    /// Deserializes and validates an already-built source stack.
    pub fn from_config(config: Config) -> Result<Self, SettingsError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let board = &self.board;
        if board.comment_ttl_secs == 0 {
            return Err(SettingsError::Invalid("board.comment_ttl_secs must be positive".into()));
        }
        if board.cleanup_interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "board.cleanup_interval_secs must be positive".into(),
            ));
        }
        if board.session_queue_capacity == 0 {
            return Err(SettingsError::Invalid(
                "board.session_queue_capacity must be positive".into(),
            ));
        }
        if board.auth_timeout_ms == 0 {
            return Err(SettingsError::Invalid("board.auth_timeout_ms must be positive".into()));
        }
        if self.database.url.trim().is_empty() {
            return Err(SettingsError::Invalid("database.url is empty".into()));
        }
        if let Some(remote) = &self.auth.remote {
            if remote.base_url.trim().is_empty() {
                return Err(SettingsError::Invalid("auth.remote.base_url is empty".into()));
            }
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix("RB")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use secrecy::ExposeSecret;

    fn from_toml(toml: &str) -> Result<Settings, SettingsError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Settings::from_config(config)
    }

    #[test]
    fn test_defaults_apply_without_sources() {
        let settings = from_toml("").unwrap();

        assert_eq!(settings.board.comment_ttl(), Duration::from_secs(300));
        assert_eq!(settings.board.cleanup_interval(), Duration::from_secs(60));
        assert_eq!(settings.board.session_queue_capacity, 32);
        assert_eq!(settings.board.auth_timeout(), Duration::from_secs(3));
        assert_eq!(settings.server.bind_address, "0.0.0.0:8080");
        assert!(settings.auth.remote.is_none());
        assert!(settings.auth.accounts.is_empty());
        assert!(!settings.log.json);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let settings = from_toml(
            r#"
            [board]
            comment_ttl_secs = 120
            session_queue_capacity = 8

            [auth.remote]
            base_url = "http://auth.internal"
            api_key = "s3cret"

            [[auth.accounts]]
            id = 7
            username = "mod"
            role = "moderator"
            token_sha256 = "abcd"
            "#,
        )
        .unwrap();

        assert_eq!(settings.board.comment_ttl_secs, 120);
        assert_eq!(settings.board.session_queue_capacity, 8);
        assert_eq!(settings.board.cleanup_interval_secs, 60);

        let remote = settings.auth.remote.as_ref().unwrap();
        assert_eq!(remote.base_url, "http://auth.internal");
        assert_eq!(remote.api_key.as_ref().unwrap().expose_secret(), "s3cret");
        assert_eq!(remote.timeout(), Duration::from_secs(2));

        let account = &settings.auth.accounts[0];
        assert_eq!((account.id, account.role.as_str(), account.banned), (7, "moderator", false));
    }

    #[test]
    fn test_environment_overrides_file() {
        let env = config::Map::from([("RB_BOARD__CLEANUP_INTERVAL_SECS".to_string(), "15".to_string())]);
        let config = Config::builder()
            .add_source(File::from_str("[board]\ncleanup_interval_secs = 30", FileFormat::Toml))
            .add_source(environment().source(Some(env)))
            .build()
            .unwrap();

        let settings = Settings::from_config(config).unwrap();
        assert_eq!(settings.board.cleanup_interval_secs, 15);
    }

    #[test]
    fn test_zero_values_are_rejected() {
        for toml in [
            "[board]\ncomment_ttl_secs = 0",
            "[board]\ncleanup_interval_secs = 0",
            "[board]\nsession_queue_capacity = 0",
            "[board]\nauth_timeout_ms = 0",
        ] {
            let err = from_toml(toml).unwrap_err();
            assert!(matches!(err, SettingsError::Invalid(_)), "{toml}: {err}");
        }
    }

    #[test]
    fn test_api_key_is_redacted_in_debug() {
        let settings = from_toml("[auth.remote]\nbase_url = \"http://a\"\napi_key = \"hunter2\"").unwrap();
        assert!(!format!("{settings:?}").contains("hunter2"));
    }
}
