//! Configuration for the player data layer
//!
//! Loaded from (in order of preference) a TOML document, environment
//! variables, or defaults:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | PLAYERSTORE_PREFIX | PlayerData | Store name prefix |
//! | PLAYERSTORE_VERSION | 0 | Schema version appended to the store name |
//! | PLAYERSTORE_RESOLVE_RETRIES | 10 | Attempts to open each store |
//! | PLAYERSTORE_LOAD_RETRIES | 5 | Attempts per key on load |
//! | PLAYERSTORE_SAVE_RETRIES | 5 | Attempts per key on save |
//! | PLAYERSTORE_RETRY_BACKOFF_MS | 0 | Delay between attempts |
//! | PLAYERSTORE_AUTOSAVE_SECS | unset | Periodic flush interval |
//! | PLAYERSTORE_ENV | production | `production` or `development` |
//! | PLAYERSTORE_SAVE_IN_DEV | false | Flush on shutdown in development |
//! | PLAYERSTORE_SNAPSHOT_POLL_MS | 100 | Client snapshot poll interval |

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// Explicit limits with _MAX suffix
pub const RETRIES_MAX: u32 = 100;
pub const DEFAULT_RESOLVE_RETRIES: u32 = 10;
pub const DEFAULT_LOAD_RETRIES: u32 = 5;
pub const DEFAULT_SAVE_RETRIES: u32 = 5;
pub const DEFAULT_STORE_PREFIX: &str = "PlayerData";

/// Where the host process is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostEnvironment {
    #[default]
    Production,
    /// Local debug sessions; flush-on-shutdown is skipped unless enabled
    Development,
}

impl HostEnvironment {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Some(HostEnvironment::Production),
            "development" | "dev" | "studio" => Some(HostEnvironment::Development),
            _ => None,
        }
    }
}

/// Tunables for resolution, load, save and replication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerDataConfig {
    /// Store name prefix; the schema version is appended to it
    pub store_prefix: String,
    /// Schema version number
    pub version: u32,
    /// Attempts to open each store during initialization
    pub resolve_retries: u32,
    /// Attempts per key when loading a player
    pub load_retries: u32,
    /// Attempts per key when saving a player
    pub save_retries: u32,
    /// Delay between attempts (0 = immediate re-attempt)
    pub retry_backoff_ms: u64,
    /// Periodic flush of every connected session (None = disabled)
    pub autosave_interval_secs: Option<u64>,
    pub environment: HostEnvironment,
    /// Flush sessions on shutdown even in development
    pub save_on_shutdown_in_development: bool,
    /// Client mirror poll interval while the server session is loading
    pub snapshot_poll_ms: u64,
}

impl Default for PlayerDataConfig {
    fn default() -> Self {
        PlayerDataConfig {
            store_prefix: DEFAULT_STORE_PREFIX.to_string(),
            version: 0,
            resolve_retries: DEFAULT_RESOLVE_RETRIES,
            load_retries: DEFAULT_LOAD_RETRIES,
            save_retries: DEFAULT_SAVE_RETRIES,
            retry_backoff_ms: 0,
            autosave_interval_secs: None,
            environment: HostEnvironment::Production,
            save_on_shutdown_in_development: false,
            snapshot_poll_ms: 100,
        }
    }
}

impl PlayerDataConfig {
    /// Configuration for tests (no backoff, fast polling)
    pub fn test() -> Self {
        PlayerDataConfig {
            snapshot_poll_ms: 5,
            ..Default::default()
        }
    }

    /// Builder: set the schema version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = PlayerDataConfig::default();
        let config = PlayerDataConfig {
            store_prefix: std::env::var("PLAYERSTORE_PREFIX").unwrap_or(defaults.store_prefix),
            version: env_parse("PLAYERSTORE_VERSION").unwrap_or(defaults.version),
            resolve_retries: env_parse("PLAYERSTORE_RESOLVE_RETRIES")
                .unwrap_or(defaults.resolve_retries),
            load_retries: env_parse("PLAYERSTORE_LOAD_RETRIES").unwrap_or(defaults.load_retries),
            save_retries: env_parse("PLAYERSTORE_SAVE_RETRIES").unwrap_or(defaults.save_retries),
            retry_backoff_ms: env_parse("PLAYERSTORE_RETRY_BACKOFF_MS")
                .unwrap_or(defaults.retry_backoff_ms),
            autosave_interval_secs: env_parse("PLAYERSTORE_AUTOSAVE_SECS"),
            environment: std::env::var("PLAYERSTORE_ENV")
                .ok()
                .and_then(|s| HostEnvironment::parse(&s))
                .unwrap_or(defaults.environment),
            save_on_shutdown_in_development: std::env::var("PLAYERSTORE_SAVE_IN_DEV")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.save_on_shutdown_in_development),
            snapshot_poll_ms: env_parse("PLAYERSTORE_SNAPSHOT_POLL_MS")
                .unwrap_or(defaults.snapshot_poll_ms),
        };
        config.normalized()
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        let config: PlayerDataConfig = toml::from_str(s)?;
        Ok(config.normalized())
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self, crate::PlayerDataError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            crate::PlayerDataError::Config(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| crate::PlayerDataError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Clamp retry bounds into `[1, RETRIES_MAX]`
    pub fn normalized(mut self) -> Self {
        self.resolve_retries = self.resolve_retries.clamp(1, RETRIES_MAX);
        self.load_retries = self.load_retries.clamp(1, RETRIES_MAX);
        self.save_retries = self.save_retries.clamp(1, RETRIES_MAX);
        self.verify_invariants();
        self
    }

    #[inline]
    fn verify_invariants(&self) {
        debug_assert!(
            (1..=RETRIES_MAX).contains(&self.resolve_retries),
            "Invariant: resolve_retries {} out of range",
            self.resolve_retries
        );
        debug_assert!(
            (1..=RETRIES_MAX).contains(&self.load_retries),
            "Invariant: load_retries {} out of range",
            self.load_retries
        );
        debug_assert!(
            (1..=RETRIES_MAX).contains(&self.save_retries),
            "Invariant: save_retries {} out of range",
            self.save_retries
        );
    }

    /// Versioned store name, e.g. `PlayerData0`
    pub fn store_name(&self) -> String {
        format!("{}{}", self.store_prefix, self.version)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        self.autosave_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn snapshot_poll_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_poll_ms.max(1))
    }

    /// Whether sessions still connected at shutdown should be flushed
    pub fn flush_on_shutdown(&self) -> bool {
        match self.environment {
            HostEnvironment::Production => true,
            HostEnvironment::Development => self.save_on_shutdown_in_development,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
