//! Configuration management for tweetfeed.
//!
//! Configuration is read from `~/.config/tweetfeed/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.
//! Command-line flags override individual values after loading.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound for configured timeouts and intervals (one year).
const MAX_WAIT_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub upstream: UpstreamConfig,
    pub poll: PollConfig,
}

/// Which upstream grammar to speak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTML profile page plus `items_html` pagination envelopes
    #[default]
    Legacy,
    /// Guest-token authenticated JSON timeline
    Structured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds (default: 20). The first page of a walk uses twice this.
    pub timeout_secs: u64,

    /// User agent string sent with every request
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0"
                .to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.min(MAX_WAIT_SECS))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub protocol: Protocol,
    pub web_base_url: String,
    pub api_base_url: String,
    /// Script bundle scanned for the public bearer token
    pub asset_url: String,
    pub user_by_screen_name_query_id: String,
    /// Skip the asset scan and use this bearer token
    pub bearer_token: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Legacy,
            web_base_url: "https://twitter.com".to_string(),
            api_base_url: "https://api.twitter.com".to_string(),
            asset_url: "https://abs.twimg.com/responsive-web/client-web/main.js".to_string(),
            user_by_screen_name_query_id: "-xfUfZsnR_zqjFd-IfrN5A".to_string(),
            bearer_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between two poll ticks (default: 60)
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.min(MAX_WAIT_SECS))
    }

    /// Parse interval string like "1h", "30m", "90s" or raw seconds
    pub fn parse_interval(s: &str) -> Result<u64, String> {
        let s = s.trim().to_lowercase();

        let (digits, scale) = if let Some(hours) = s.strip_suffix('h') {
            (hours, 3600)
        } else if let Some(minutes) = s.strip_suffix('m') {
            (minutes, 60)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1)
        } else {
            (s.as_str(), 1)
        };

        match digits.parse::<u64>() {
            Ok(0) => Err("Interval must be greater than zero".to_string()),
            Ok(n) => n
                .checked_mul(scale)
                .ok_or_else(|| format!("Interval is too large: {}", s)),
            Err(_) => Err(format!(
                "Invalid interval: {}. Use format like '60s', '5m', '1h'",
                s
            )),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/tweetfeed/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("tweetfeed").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> String {
        r##"# tweetfeed configuration

[fetch]
# Per-request timeout in seconds; the first page of every walk gets twice this
timeout_secs = 20
user_agent = "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0"

[upstream]
# "legacy" scrapes the HTML profile page, "structured" uses the JSON timeline API
protocol = "legacy"
web_base_url = "https://twitter.com"
api_base_url = "https://api.twitter.com"

# Script bundle scanned for the public bearer token (structured protocol only)
asset_url = "https://abs.twimg.com/responsive-web/client-web/main.js"
user_by_screen_name_query_id = "-xfUfZsnR_zqjFd-IfrN5A"

# Uncomment to skip the asset scan
# bearer_token = ""

[poll]
# Seconds between two checks in watch mode
interval_secs = 60
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
