//! Settings and saved credentials for huelink.
//!
//! `settings.toml` tunes discovery, timeouts and rate limits and is read
//! through figment (defaults, then the file, then `HUELINK_*` variables).
//! The paired bridge itself lives in `bridge.toml`, behind
//! [`FileCredentialStore`], which implements core's `CredentialStore`.

mod store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use huelink_core::{CoreError, LinkConfig, QueueConfig, QueueSettings};

pub use store::{FileCredentialStore, USERNAME_ENV, resolve_username};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        CoreError::Configuration {
            message: err.to_string(),
        }
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// User-tunable behaviour. Every field has a default, so an absent file is
/// a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Public bridge lookup endpoint.
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,

    #[serde(default = "default_mdns_timeout")]
    pub mdns_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Device half of the name the bridge records for our key.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Keep the application key in the system keyring instead of
    /// `bridge.toml`.
    #[serde(default)]
    pub use_keyring: bool,

    #[serde(default = "default_light_limits")]
    pub lights: QueueLimits,

    #[serde(default = "default_group_limits")]
    pub groups: QueueLimits,
}

/// Rate limit and backlog for one command queue.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct QueueLimits {
    pub requests_per_second: f64,
    /// Admitted but unsettled commands; omitted means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queue_length: Option<usize>,
}

impl From<QueueConfig> for QueueLimits {
    fn from(config: QueueConfig) -> Self {
        Self {
            requests_per_second: config.requests_per_second,
            max_queue_length: config.max_queue_length,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            discovery_url: default_discovery_url(),
            mdns_timeout_secs: default_mdns_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            device_name: default_device_name(),
            use_keyring: false,
            lights: default_light_limits(),
            groups: default_group_limits(),
        }
    }
}

fn default_discovery_url() -> String {
    LinkConfig::default().discovery_url
}
fn default_mdns_timeout() -> u64 {
    5
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    10
}
fn default_device_name() -> String {
    "cli".into()
}
fn default_light_limits() -> QueueLimits {
    QueueSettings::default().lights.into()
}
fn default_group_limits() -> QueueLimits {
    QueueSettings::default().groups.into()
}

impl Settings {
    /// Translate into core's link tuning, rejecting values that cannot work.
    pub fn to_link_config(&self) -> Result<LinkConfig, ConfigError> {
        Ok(LinkConfig {
            discovery_url: self.discovery_url.clone(),
            mdns_timeout: Duration::from_secs(self.mdns_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            queues: QueueSettings {
                lights: queue_config("lights", self.lights)?,
                groups: queue_config("groups", self.groups)?,
            },
            device_type: huelink_core::device_type("huelink", &self.device_name),
        })
    }
}

fn queue_config(name: &str, limits: QueueLimits) -> Result<QueueConfig, ConfigError> {
    if !(limits.requests_per_second.is_finite() && limits.requests_per_second > 0.0) {
        return Err(ConfigError::Validation {
            field: format!("{name}.requests_per_second"),
            reason: format!("must be a positive number, got {}", limits.requests_per_second),
        });
    }
    let config = QueueConfig::per_second(limits.requests_per_second);
    Ok(match limits.max_queue_length {
        Some(max) => config.with_max_queue_length(max),
        None => config,
    })
}

// ── Paths ───────────────────────────────────────────────────────────

/// Platform config directory, e.g. `~/.config/huelink` on Linux.
pub fn config_dir() -> PathBuf {
    ProjectDirs::from("com", "huelink", "huelink").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("huelink");
            p
        },
        |dirs| dirs.config_dir().to_path_buf(),
    )
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.toml")
}

pub fn credentials_path() -> PathBuf {
    config_dir().join("bridge.toml")
}

// ── Loading and saving ──────────────────────────────────────────────

/// Load settings from `path` and the environment. A missing file yields
/// the defaults.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let settings = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HUELINK_").split("__"))
        .extract()?;
    Ok(settings)
}

pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(&settings_path())
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(settings)?)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.lights.max_queue_length, Some(25));
        assert_eq!(settings.groups.max_queue_length, Some(5));
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "request_timeout_secs = 3\ndevice_name = \"kitchen-pi\"\n\n[groups]\nrequests_per_second = 2.0\n",
        )
        .unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.request_timeout_secs, 3);
        assert_eq!(settings.connect_timeout_secs, 5);
        // Nested tables merge with the defaults field by field.
        assert_eq!(settings.groups.max_queue_length, Some(5));

        let link = settings.to_link_config().unwrap();
        assert_eq!(link.request_timeout, Duration::from_secs(3));
        assert_eq!(link.device_type, "huelink#kitchen-pi");
        assert_eq!(link.queues.groups.max_queue_length, Some(5));
        assert!((link.queues.groups.requests_per_second - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let settings = Settings {
            mdns_timeout_secs: 9,
            use_keyring: true,
            ..Settings::default()
        };
        save_settings_to(&settings, &path).unwrap();
        assert_eq!(load_settings_from(&path).unwrap(), settings);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let settings = Settings {
            lights: QueueLimits {
                requests_per_second: 0.0,
                max_queue_length: None,
            },
            ..Settings::default()
        };
        let err = settings.to_link_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "lights.requests_per_second"));
    }
}
