//! Configuration file parser for ~/.config/opds-explorer/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which registers Project Gutenberg as the starter catalog.
//! Unknown top-level keys are accepted and logged as warnings.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::opds::FeedConfig;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// Catalog passwords are `SecretString`s, so the derived `Debug` never
/// prints them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deadline wrapped around each catalog fetch, in seconds. 0 = no deadline.
    pub request_timeout_secs: u64,

    /// Number of pages `browse` accumulates when `--pages` is not given.
    pub max_pages: u32,

    /// Registered catalogs, in display order.
    pub feeds: Vec<FeedConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_pages: 1,
            feeds: vec![default_feed()],
        }
    }
}

/// The catalog every fresh install starts with.
pub fn default_feed() -> FeedConfig {
    FeedConfig {
        subtitle: "Free eBooks since 1971.".to_string(),
        image_url: "https://www.gutenberg.org/gutenberg/favicon.ico".to_string(),
        ..FeedConfig::new("https://m.gutenberg.org/ebooks.opds/").with_title("Project Gutenberg")
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML or wrong value types → `Err(ConfigError::Parse)`
    /// - Unknown top-level keys → warned about and ignored
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["request_timeout_secs", "max_pages", "feeds"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// The per-fetch deadline, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

// ============================================================================
// Tests
// ============================================================================
