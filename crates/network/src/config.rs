// crates/network/src/config.rs
//! Network configuration
//!
//! Loaded from a TOML file; missing keys fall back to defaults.
//!
//! ```toml
//! request_timeout_secs = 30
//! resource_timeout_secs = 30
//! business_success_code = 0
//! app_version = "2.3.1"
//! os_version = "17.4"
//! ```

use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration shared by the transport, composer and orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Idle timeout while waiting for data
    pub request_timeout_secs: u64,
    /// Total time budget for one request
    pub resource_timeout_secs: u64,
    /// Envelope `code` that means success
    pub business_success_code: i64,
    /// Application version for the User-Agent header
    pub app_version: String,
    /// Platform name for the User-Agent header
    pub platform: String,
    /// Platform version for the User-Agent header
    pub os_version: String,
    /// Directory for the default download destination
    pub downloads_dir: Option<PathBuf>,
    /// Directory for partial downloads; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,
    /// URLs probed by `ConnectivityProbe`
    pub probe_urls: Vec<String>,
    /// Seconds between connectivity probes
    pub probe_interval_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            resource_timeout_secs: 30,
            business_success_code: 0,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            os_version: "unknown".to_string(),
            downloads_dir: None,
            temp_dir: None,
            probe_urls: vec![
                "https://www.google.com".to_string(),
                "https://www.cloudflare.com".to_string(),
                "https://www.rust-lang.org".to_string(),
            ],
            probe_interval_secs: 15,
        }
    }
}

impl NetworkConfig {
    /// Loads configuration from a TOML file
    ///
    /// A missing file yields the default configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No network config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.resource_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "resource_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.probe_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "probe_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.app_version.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "app_version must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn resource_timeout(&self) -> Duration {
        Duration::from_secs(self.resource_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// `<platform>/<os_version> App/<app_version>`
    pub fn user_agent(&self) -> String {
        format!("{}/{} App/{}", self.platform, self.os_version, self.app_version)
    }

    /// Directory partial downloads are written to
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Directory used by the default download destination
    ///
    /// Falls back to `<user data dir>/Downloads`, then to the system temp dir.
    pub fn downloads_dir(&self) -> PathBuf {
        if let Some(dir) = &self.downloads_dir {
            return dir.clone();
        }
        ProjectDirs::from("", "", "tznetworking")
            .map(|dirs| dirs.data_dir().join("Downloads"))
            .unwrap_or_else(|| std::env::temp_dir().join("tznetworking").join("Downloads"))
    }
}
