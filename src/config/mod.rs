// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! Configuration management for gbak.
//!
//! # Configuration Hierarchy
//!
//! ```text
//! Priority (low → high)
//! 1. defaults
//! 2. --config FILE (TOML)
//! 3. GBAK_* env vars
//! 4. CLI overrides
//! ```
//!
//! # Environment Variable Mapping
//!
//! ```text
//! GBAK_API__BASE_URL=http://localhost:8080  → api.base_url
//! GBAK_RATE_LIMIT__WAIT_SECS=30             → rate_limit.wait_secs
//! GBAK_LOG__LEVEL=4                         → log.level
//! ```

pub mod loader;


use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::logging::LogLevel;
use crate::net::RateLimitPolicy;

use loader::ConfigLoader;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Remote API endpoints and HTTP client settings.
    pub api: ApiConfig,
    /// Proactive rate-limit backoff.
    pub rate_limit: RateLimitConfig,
    /// Logging.
    pub log: LogSection,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// REST API root (search and branch endpoints).
    pub base_url: String,
    /// Web root serving `/{account}/{repo}/archive/refs/heads/...`.
    pub archive_url: String,
    /// Records requested per page (1-100).
    pub per_page: u8,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Redirects followed before giving up.
    pub max_redirects: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            archive_url: "https://github.com".to_string(),
            per_page: 100,
            connect_timeout_secs: 30,
            max_redirects: 10,
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// `[rate_limit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Back off when the remaining quota drops below this.
    pub warning_threshold: u64,
    /// Length of the backoff wait in ticks.
    pub wait_secs: u32,
    /// Length of one tick; cancellation is checked once per tick.
    pub poll_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 10,
            wait_secs: 10,
            poll_interval_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub const fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(
            self.warning_threshold,
            self.wait_secs,
            Duration::from_millis(self.poll_interval_ms),
        )
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// Console verbosity (0-5).
    pub level: LogLevel,
    /// Optional log file.
    pub file: Option<PathBuf>,
}

impl Config {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> ConfigLoader {
        ConfigLoader::new()
    }

    /// Load configuration from a single TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid TOML, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::builder().add_toml_file(path).build()
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid TOML or fails validation.
    pub fn parse(content: &str) -> Result<Self> {
        Self::builder().add_toml_str(content).build()
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first offending key.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(1..=100).contains(&self.api.per_page) {
            return Err(invalid(
                "api",
                "per_page",
                format!("must be 1-100, got {}", self.api.per_page),
            ));
        }
        for (key, url) in [
            ("base_url", &self.api.base_url),
            ("archive_url", &self.api.archive_url),
        ] {
            if let Err(e) = reqwest::Url::parse(url) {
                return Err(invalid("api", key, format!("'{url}' is not a URL: {e}")));
            }
        }
        if self.rate_limit.poll_interval_ms == 0 {
            return Err(invalid(
                "rate_limit",
                "poll_interval_ms",
                "must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(section: &str, key: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        message,
    }
}
