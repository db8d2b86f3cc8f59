//! TOML-based configuration for the daemon.
//!
//! Reads and writes [`AppConfig`] to the platform-appropriate config file:
//! - Linux:    `~/.config/luxd/config.toml`
//! - macOS:    `~/Library/Application Support/luxd/config.toml`
//! - Windows:  `%APPDATA%\luxd\config.toml`
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return
//! value of `some_fn()` when absent from the file, so the daemon works on
//! first run and when upgrading from an older config missing newer fields.

use std::path::PathBuf;

use lux_core::ModeKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub location: LocationSection,
    pub sensor: SensorSection,
    pub network: NetworkSection,
}

/// General engine behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// When `true`, the user pinned a mode and automatic re-resolution is off.
    #[serde(default)]
    pub override_adaptive_mode: bool,
    /// The pinned (or last active) adaptive mode.
    #[serde(default = "default_adaptive_mode")]
    pub adaptive_mode: ModeKey,
    /// Also enumerate virtual displays.
    #[serde(default)]
    pub include_virtual_displays: bool,
    /// Force Manual when the lid closes while Sync mode is active.
    #[serde(default = "default_true")]
    pub clamshell_detection: bool,
}

/// Coordinates and curve shape for the Location mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationSection {
    /// Degrees north; absent disables the Location mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Degrees east.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default = "default_noon_duration")]
    pub noon_duration_minutes: i64,
    #[serde(default = "default_daylight_extension")]
    pub daylight_extension_minutes: i64,
    #[serde(default = "default_curve_factor")]
    pub curve_factor: f64,
}

/// Ambient light sensor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSection {
    /// Serial device the sensor prints lux lines to; absent disables Sensor mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,
    /// Lux value mapped to 100% brightness.
    #[serde(default = "default_max_lux")]
    pub max_lux: f64,
}

/// Network relay settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// Base URL of the relay; absent disables the network channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_adaptive_mode() -> ModeKey {
    ModeKey::Manual
}
fn default_true() -> bool {
    true
}
fn default_noon_duration() -> i64 {
    180
}
fn default_daylight_extension() -> i64 {
    180
}
fn default_curve_factor() -> f64 {
    0.5
}
fn default_max_lux() -> f64 {
    2000.0
}
fn default_relay_timeout_ms() -> u64 {
    2000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineSection::default(),
            location: LocationSection::default(),
            sensor: SensorSection::default(),
            network: NetworkSection::default(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            override_adaptive_mode: false,
            adaptive_mode: default_adaptive_mode(),
            include_virtual_displays: false,
            clamshell_detection: default_true(),
        }
    }
}

impl Default for LocationSection {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            noon_duration_minutes: default_noon_duration(),
            daylight_extension_minutes: default_daylight_extension(),
            curve_factor: default_curve_factor(),
        }
    }
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            device: None,
            max_lux: default_max_lux(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            relay_url: None,
            timeout_ms: default_relay_timeout_ms(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`AppConfig`] from disk, returning `AppConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the config directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory including the `luxd` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("luxd"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("luxd")
        })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("luxd"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default_has_expected_engine_settings() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.log_level, "info");
        assert_eq!(cfg.engine.adaptive_mode, ModeKey::Manual);
        assert!(!cfg.engine.override_adaptive_mode);
        assert!(cfg.engine.clamshell_detection);
    }

    #[test]
    fn test_app_config_default_disables_optional_collaborators() {
        let cfg = AppConfig::default();
        assert!(cfg.location.latitude.is_none());
        assert!(cfg.sensor.device.is_none());
        assert!(cfg.network.relay_url.is_none());
    }

    #[test]
    fn test_app_config_round_trips_through_toml() {
        let mut cfg = AppConfig::default();
        cfg.engine.adaptive_mode = ModeKey::Location;
        cfg.location.latitude = Some(44.43);
        cfg.location.longitude = Some(26.1);
        cfg.network.relay_url = Some("http://192.168.1.40:9123".to_string());

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&text).expect("deserialize");
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_deserialize_minimal_toml_uses_defaults() {
        let text = r#"
[engine]
[location]
[sensor]
[network]
"#;
        let cfg: AppConfig = toml::from_str(text).expect("deserialize minimal");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_deserialize_partial_section_overrides_defaults() {
        let text = r#"
[engine]
adaptive_mode = "sensor"
[location]
noon_duration_minutes = 60
[sensor]
[network]
"#;
        let cfg: AppConfig = toml::from_str(text).expect("deserialize partial");
        assert_eq!(cfg.engine.adaptive_mode, ModeKey::Sensor);
        assert_eq!(cfg.location.noon_duration_minutes, 60);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.location.daylight_extension_minutes, 180);
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }
}
