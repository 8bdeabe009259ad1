//! Configuration file parser for `config.toml`.
//!
//! Every key except `bot_token` and `admins` has a default. Unknown keys are
//! accepted (serde ignores them) but logged as likely typos. The bot token may
//! come from the `FEEDRELAY_BOT_TOKEN` environment variable instead, which wins
//! over the file.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::storage::DEFAULT_PREFIX;
use crate::transport::telegram::DEFAULT_API_URL;

pub const TOKEN_ENV_VAR: &str = "FEEDRELAY_BOT_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Process configuration, loaded once at startup.
///
/// Custom Debug impl masks `bot_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram bot token. `FEEDRELAY_BOT_TOKEN` takes precedence.
    pub bot_token: Option<String>,

    /// User ids allowed to issue commands.
    pub admins: Vec<i64>,

    /// Bot API base URL, without the `/bot<token>` part.
    pub api_url: String,

    /// SQLite database file, or `":memory:"` for a non-persistent store.
    pub database_path: String,

    /// Namespace prepended to every store key.
    pub key_prefix: String,

    pub poll_interval_secs: u64,

    /// Delay before the first poll after startup.
    pub initial_delay_secs: u64,

    /// Upper bound on feeds fetched and delivered at the same time.
    pub max_concurrent_feeds: usize,

    /// Allow subscribing to localhost and private network addresses.
    pub allow_private_hosts: bool,

    /// Default tracing filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            admins: Vec::new(),
            api_url: DEFAULT_API_URL.to_string(),
            database_path: "feedrelay.db".to_string(),
            key_prefix: DEFAULT_PREFIX.to_string(),
            poll_interval_secs: 60,
            initial_delay_secs: 2,
            max_concurrent_feeds: 10,
            allow_private_hosts: false,
            log_level: "info".to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("admins", &self.admins)
            .field("api_url", &self.api_url)
            .field("database_path", &self.database_path)
            .field("key_prefix", &self.key_prefix)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("initial_delay_secs", &self.initial_delay_secs)
            .field("max_concurrent_feeds", &self.max_concurrent_feeds)
            .field("allow_private_hosts", &self.allow_private_hosts)
            .field("log_level", &self.log_level)
            .finish()
    }
}

const KNOWN_KEYS: [&str; 10] = [
    "bot_token",
    "admins",
    "api_url",
    "database_path",
    "key_prefix",
    "poll_interval_secs",
    "initial_delay_secs",
    "max_concurrent_feeds",
    "allow_private_hosts",
    "log_level",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load, apply the environment override and validate.
    ///
    /// - Missing or empty file → defaults (still needs token and admins to validate)
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            config.override_token(token);
        }
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    /// Parse TOML text, warning about unknown keys. Does not validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    /// Replace the file's token with one from the environment; blank values are ignored
    pub fn override_token(&mut self, token: String) {
        if !token.trim().is_empty() {
            self.bot_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.bot_token.as_deref() {
            Some(t) if !t.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "bot_token is required (or set {TOKEN_ENV_VAR})"
                )))
            }
        }
        if self.admins.is_empty() {
            return Err(ConfigError::Invalid(
                "admins must list at least one user id".into(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }
        if self.max_concurrent_feeds == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_feeds must be greater than 0".into(),
            ));
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::Invalid("key_prefix must not be empty".into()));
        }
        url::Url::parse(&self.api_url)
            .map_err(|e| ConfigError::Invalid(format!("api_url: {e}")))?;
        Ok(())
    }

    pub fn bot_token(&self) -> SecretString {
        SecretString::from(self.bot_token.clone().unwrap_or_default())
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const MINIMAL: &str = "bot_token = \"123:abc\"\nadmins = [42]\n";

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, "https://api.telegram.org");
        assert_eq!(config.key_prefix, "pythonbot:rss");
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.initial_delay_secs, 2);
        assert_eq!(config.max_concurrent_feeds, 10);
        assert!(!config.allow_private_hosts);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minimal_config_validates() {
        let config = Config::from_toml(MINIMAL).unwrap();
        config.validate().unwrap();
        assert!(config.is_admin(42));
        assert!(!config.is_admin(7));
        assert_eq!(config.bot_token().expose_secret(), "123:abc");
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = Path::new("/tmp/feedrelay_test_nonexistent_config.toml");
        let config = Config::read(path).unwrap();
        assert!(config.bot_token.is_none());
    }

    #[test]
    fn test_full_config() {
        let content = r#"
bot_token = "123:abc"
admins = [1, 2]
api_url = "http://127.0.0.1:8081"
database_path = ":memory:"
key_prefix = "test:rss"
poll_interval_secs = 300
initial_delay_secs = 0
max_concurrent_feeds = 4
allow_private_hosts = true
log_level = "debug"
"#;
        let config = Config::from_toml(content).unwrap();
        config.validate().unwrap();
        assert_eq!(config.admins, vec![1, 2]);
        assert_eq!(config.database_path, ":memory:");
        assert_eq!(config.key_prefix, "test:rss");
        assert_eq!(config.max_concurrent_feeds, 4);
        assert!(config.allow_private_hosts);
        assert_eq!(config.initial_delay(), Duration::ZERO);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::from_toml("admins = \"everyone\"\n").is_err());
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = format!("{MINIMAL}totally_fake_key = 1\n");
        let config = Config::from_toml(&content).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_failures() {
        let no_admins = Config::from_toml("bot_token = \"t\"\n").unwrap();
        assert!(matches!(no_admins.validate(), Err(ConfigError::Invalid(_))));

        let no_token = Config::from_toml("admins = [1]\n").unwrap();
        assert!(no_token.validate().is_err());

        let zero_interval =
            Config::from_toml(&format!("{MINIMAL}poll_interval_secs = 0\n")).unwrap();
        assert!(zero_interval.validate().is_err());

        let bad_api = Config::from_toml(&format!("{MINIMAL}api_url = \"not a url\"\n")).unwrap();
        assert!(bad_api.validate().is_err());
    }

    #[test]
    fn test_env_token_overrides_file() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.override_token("999:env".to_string());
        assert_eq!(config.bot_token().expose_secret(), "999:env");

        config.override_token("   ".to_string());
        assert_eq!(config.bot_token().expose_secret(), "999:env");
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("feedrelay_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::read(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_reads_file() {
        let dir = std::env::temp_dir().join("feedrelay_config_test_load");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = Config::read(&path).unwrap();
        assert_eq!(config.admins, vec![42]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_debug_masks_token() {
        let config = Config::from_toml(MINIMAL).unwrap();
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("123:abc"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
