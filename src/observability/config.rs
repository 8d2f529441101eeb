//! Logging Configuration
//!
//! All settings are loaded from environment variables for 12-factor compliance.

/// Logging configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive (default: `info`, overridden by RUST_LOG)
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Service version (default: from Cargo.toml)
    pub version: String,
    /// Extra static fields (parsed from PLAYERSTORE_LOG_TAGS)
    pub tags: Vec<(String, String)>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl LogConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        LogConfig {
            filter: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json: std::env::var("PLAYERSTORE_LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            service_name: std::env::var("PLAYERSTORE_SERVICE")
                .unwrap_or_else(|_| "player-store".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tags: parse_tags(&std::env::var("PLAYERSTORE_LOG_TAGS").unwrap_or_default()),
        }
    }

    /// Tags formatted as `key:value`
    pub fn formatted_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect()
    }
}

/// Parse `key1:value1,key2:value2`
fn parse_tags(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|tag| {
            let (k, v) = tag.split_once(':')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}
