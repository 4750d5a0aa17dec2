//! Monitor configuration management
//!
//! Settings come from built-in defaults, an optional TOML file and finally
//! command-line flags, in increasing order of precedence.
//!
//! # Example Configuration
//! ```toml
//! [monitor]
//! interval_secs = 2.5
//! log_file = "~/usb_monitor.log"
//! debug = false
//! log_format = "text"
//!
//! [usb]
//! filters = ["0x0781:*"]
//! include_root_hubs = false
//! ```

use crate::event_log::LogFormat;
use crate::usb::DeviceFilter;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Poll interval used when none is configured
pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;
/// Event log path used when none is configured
pub const DEFAULT_LOG_FILE: &str = "usb_monitor.log";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Seconds between polls; fractional values are allowed
    #[serde(default = "MonitorSettings::default_interval")]
    pub interval_secs: f64,
    /// Event log path; `~` is expanded
    #[serde(default = "MonitorSettings::default_log_file")]
    pub log_file: PathBuf,
    /// Write diagnostics to the event log and log debug output on stderr
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: Self::default_interval(),
            log_file: Self::default_log_file(),
            debug: false,
            log_format: LogFormat::default(),
        }
    }
}

impl MonitorSettings {
    fn default_interval() -> f64 {
        DEFAULT_INTERVAL_SECS
    }

    fn default_log_file() -> PathBuf {
        PathBuf::from(DEFAULT_LOG_FILE)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsbSettings {
    /// VID:PID patterns to watch; empty watches every device
    #[serde(default)]
    pub filters: Vec<String>,
    /// Report root hubs like any other device
    #[serde(default)]
    pub include_root_hubs: bool,
}

impl MonitorConfig {
    /// Load configuration from the specified path
    ///
    /// Without a path, the standard locations are tried in order.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => find_existing(&Self::candidate_paths())
                .ok_or_else(|| anyhow!("No configuration file found"))?,
        };

        Self::load_from(&config_path)
    }

    /// Load the first configuration file found in the standard locations
    ///
    /// Defaults are used only when none of them exists. A file that exists
    /// but cannot be read, parsed or validated is an error.
    pub fn load_or_default() -> Result<Self> {
        Ok(Self::load_first(&Self::candidate_paths())?.unwrap_or_default())
    }

    /// Load the first existing file among `candidates`, if any
    pub fn load_first(candidates: &[PathBuf]) -> Result<Option<Self>> {
        match find_existing(candidates) {
            Some(path) => Self::load_from(&path).map(Some),
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(None)
            }
        }
    }

    fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: MonitorConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Standard configuration locations, in lookup order
    pub fn candidate_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/usb-sentry/monitor.toml"),
        ]
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-sentry").join("monitor.toml")
        } else {
            PathBuf::from(".config/usb-sentry/monitor.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.interval()?;
        self.filters()?;

        if self.monitor.log_file.as_os_str().is_empty() {
            return Err(anyhow!("Log file path must not be empty"));
        }

        Ok(())
    }

    /// The poll interval as a duration
    pub fn interval(&self) -> Result<Duration> {
        interval_from_secs(self.monitor.interval_secs).map_err(|e| anyhow!(e))
    }

    /// Parsed device filters
    pub fn filters(&self) -> Result<Vec<DeviceFilter>> {
        DeviceFilter::parse_all(self.usb.filters.as_slice()).context("Invalid USB device filter")
    }

    /// Event log path with `~` expanded
    pub fn log_path(&self) -> PathBuf {
        let raw = self.monitor.log_file.to_string_lossy();
        PathBuf::from(shellexpand::tilde(&raw).into_owned())
    }
}

fn find_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.exists()).cloned()
}

/// Parse a command-line interval in seconds
pub fn parse_interval(s: &str) -> std::result::Result<f64, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    interval_from_secs(secs)?;
    Ok(secs)
}

/// Validate an interval: a positive, finite number of seconds
pub fn interval_from_secs(secs: f64) -> std::result::Result<Duration, String> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!(
            "Invalid interval {}, must be a positive number of seconds",
            secs
        ));
    }

    let interval = Duration::try_from_secs_f64(secs)
        .map_err(|e| format!("Invalid interval {}: {}", secs, e))?;

    if interval.is_zero() {
        return Err(format!("Invalid interval {}, rounds down to zero", secs));
    }

    Ok(interval)
}
