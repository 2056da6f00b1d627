//! TOML-based configuration for the host application.
//!
//! Reads and writes [`AppConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\AppShell\config.toml`
//! - Linux:    `~/.config/appshell/config.toml`
//! - macOS:    `~/Library/Application Support/AppShell/config.toml`
//!
//! Fields use `#[serde(default = "...")]` helpers so the host works on first
//! run (no file yet) and when upgrading from an older file that is missing
//! newer fields.

use std::path::PathBuf;

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

/// Top-level host configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub host: HostConfig,
    pub bridge: BridgeSettings,
    pub server: ServerSettings,
}

/// General host behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Schema version string – bump when breaking changes are introduced.
    #[serde(default = "default_version")]
    pub version: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Bridge transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSettings {
    /// Address the WebSocket bridge listener binds to. Loopback only: the
    /// bridge crosses a privilege boundary, not a network.
    #[serde(default = "default_bridge_address")]
    pub bind_address: String,
    /// Port of the bridge listener, just below the bundle-server range.
    #[serde(default = "default_bridge_port")]
    pub port: u16,
    /// Default timeout for `call` round trips, in milliseconds. Modules may
    /// override it per module at runtime.
    #[serde(default = "default_call_timeout_ms")]
    pub default_call_timeout_ms: u64,
}

/// Bundle-server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    /// Address the bundle server binds to; loopback, same reasoning as the
    /// bridge.
    #[serde(default = "default_server_host")]
    pub host: String,
    /// First candidate port (inclusive).
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,
    /// Last candidate port (inclusive).
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,
    /// Directory of the current application bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_dir: Option<PathBuf>,
    /// Previous full bundle used as second-chance lookup for differential
    /// bundles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_dir: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_version() -> String {
    "1.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_bridge_address() -> String {
    "127.0.0.1".to_string()
}
fn default_bridge_port() -> u16 {
    8033
}
fn default_call_timeout_ms() -> u64 {
    10_000
}
fn default_server_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port_range_start() -> u16 {
    8034
}
fn default_port_range_end() -> u16 {
    8063
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            bridge: BridgeSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_level: default_log_level(),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bridge_address(),
            port: default_bridge_port(),
            default_call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
            bundle_dir: None,
            fallback_dir: None,
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

/// Loads [`AppConfig`] from `path`, returning `AppConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &PathBuf) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.clone(),
            source: e,
        }),
    }
}

/// Loads [`AppConfig`] from the platform config file.
///
/// # Errors
///
/// See [`load_config_from`] plus [`ConfigError::NoPlatformConfigDir`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = config_file_path()?;
    load_config_from(&path)
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

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("AppShell"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("appshell"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("AppShell")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_range_is_8034_to_8063() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert – the fixed candidate range of the bundle server
        assert_eq!(cfg.server.port_range_start, 8034);
        assert_eq!(cfg.server.port_range_end, 8063);
    }

    #[test]
    fn test_default_bridge_port_sits_below_server_range() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.bridge.port, 8033);
        assert!(cfg.bridge.port < cfg.server.port_range_start);
    }

    #[test]
    fn test_default_addresses_are_loopback() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.bridge.bind_address, "127.0.0.1");
        assert_eq!(cfg.server.host, "127.0.0.1");
    }

    #[test]
    fn test_default_call_timeout_is_ten_seconds() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.bridge.default_call_timeout_ms, 10_000);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.server.bundle_dir = Some(PathBuf::from("/var/lib/appshell/bundle"));
        cfg.bridge.default_call_timeout_ms = 2_500;

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_none_directories_are_omitted_from_toml() {
        let cfg = AppConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        assert!(!toml_str.contains("bundle_dir"));
        assert!(!toml_str.contains("fallback_dir"));
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        // Arrange: only the section headers present
        let toml_str = r#"
[host]
[bridge]
[server]
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize minimal");

        // Assert
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_server_section_overrides_defaults() {
        let toml_str = r#"
[host]
[bridge]
[server]
port_range_start = 9000
"#;
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");
        assert_eq!(cfg.server.port_range_start, 9000);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.server.port_range_end, 8063);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_from_missing_file_returns_defaults() {
        // Arrange
        let path = PathBuf::from("/nonexistent/appshell-test/config.toml");

        // Act
        let cfg = load_config_from(&path).expect("missing file must yield defaults");

        // Assert
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_load_config_from_reads_written_file() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("appshell_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.host.log_level = "debug".to_string();
        cfg.server.port_range_end = 8100;
        std::fs::write(&path, toml::to_string_pretty(&cfg).unwrap()).unwrap();

        // Act
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded.host.log_level, "debug");
        assert_eq!(loaded.server.port_range_end, 8100);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"));
        }
        // NoPlatformConfigDir in a stripped CI environment is also acceptable.
    }
}
