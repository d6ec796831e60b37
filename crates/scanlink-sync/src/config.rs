//! # scanlink Configuration
//!
//! Configuration for the remote store, local storage, scanners and the
//! device list.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SCANLINK_REMOTE_URL=https://xyz.supabase.co                         │
//! │     SCANLINK_API_KEY=...                                                │
//! │     (legacy names SUPABASE_URL, SUPABASE_KEY, ... still honoured)       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/scanlink/scanlink.toml (Linux)                            │
//! │     ~/Library/Application Support/dev.scanlink.scanlink/... (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     remote disabled, data in the platform data dir, no devices          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [remote]
//! url = "https://xyz.supabase.co"
//! api_key = "service-key"
//! table = "barcode_scans"
//! timeout_secs = 10
//! enabled = true
//!
//! [storage]
//! data_dir = "/var/lib/scanlink"
//!
//! [sync]
//! auto_sync = true
//! backlog_interval_secs = 300
//!
//! [scanners]
//! duplicate_window_secs = 5
//! max_reconnect_attempts = 3
//!
//! [preferences]
//! sound_enabled = true
//! auto_connect = true
//!
//! [[devices]]
//! port = "COM3"
//! baud_rate = 9600
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use scanlink_core::validation::validate_device_list;
use scanlink_core::ScannerDeviceConfig;

// =============================================================================
// Remote Settings
// =============================================================================

/// Remote REST store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the project; requests go to `<url>/rest/v1/<table>`.
    #[serde(default)]
    pub url: Option<String>,

    /// API key, sent both as `apikey` and as the bearer token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Table holding one record per barcode.
    #[serde(default = "default_table")]
    pub table: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Master switch. When off, scans are only recorded locally.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_table() -> String {
    "barcode_scans".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            url: None,
            api_key: None,
            table: default_table(),
            timeout_secs: default_timeout(),
            enabled: true,
        }
    }
}

impl RemoteSettings {
    /// True when enabled and both URL and key are present.
    pub fn is_active(&self) -> bool {
        self.enabled
            && self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
            && self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory for backlog and daily cache files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "scanlink", "scanlink")
        .map(|dirs| dirs.data_dir().join("local_data"))
        .unwrap_or_else(|| PathBuf::from("local_data"))
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            data_dir: default_data_dir(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Backlog replay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Replay the backlog periodically in the background.
    #[serde(default = "default_true")]
    pub auto_sync: bool,

    /// Interval between background replays (seconds).
    #[serde(default = "default_backlog_interval")]
    pub backlog_interval_secs: u64,
}

fn default_backlog_interval() -> u64 {
    300
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            auto_sync: true,
            backlog_interval_secs: default_backlog_interval(),
        }
    }
}

impl SyncSettings {
    pub fn backlog_interval(&self) -> Duration {
        Duration::from_secs(self.backlog_interval_secs)
    }
}

// =============================================================================
// Scanner Settings
// =============================================================================

/// Timing of device workers and reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerSettings {
    /// Same-device duplicate window (seconds).
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window_secs: u64,

    /// Sleep between serial polls (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Automatic reconnect attempts before a device is left `Failed`.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Pause after closing a port before it counts as free (milliseconds).
    #[serde(default = "default_close_grace")]
    pub close_grace_ms: u64,

    /// How long `close` waits for the reader to stop (milliseconds).
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
}

fn default_duplicate_window() -> u64 {
    scanlink_core::DUPLICATE_WINDOW_SECS
}
fn default_poll_interval() -> u64 {
    scanlink_core::DEFAULT_POLL_INTERVAL_MS
}
fn default_max_reconnect_attempts() -> u32 {
    scanlink_core::DEFAULT_MAX_RECONNECT_ATTEMPTS
}
fn default_close_grace() -> u64 {
    200
}
fn default_stop_timeout() -> u64 {
    2000
}

impl Default for ScannerSettings {
    fn default() -> Self {
        ScannerSettings {
            duplicate_window_secs: default_duplicate_window(),
            poll_interval_ms: default_poll_interval(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            close_grace_ms: default_close_grace(),
            stop_timeout_ms: default_stop_timeout(),
        }
    }
}

impl ScannerSettings {
    pub fn duplicate_window(&self) -> Duration {
        Duration::from_secs(self.duplicate_window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

// =============================================================================
// Preferences
// =============================================================================

/// Operator preferences.
///
/// Only `auto_connect` is read by scanlink itself; the others are kept for
/// the UI and notification front ends that share this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub sound_enabled: bool,

    /// Connect every configured device on startup.
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    #[serde(default)]
    pub start_at_login: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            sound_enabled: true,
            auto_connect: true,
            start_at_login: false,
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete scanlink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanlinkConfig {
    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub scanners: ScannerSettings,

    #[serde(default)]
    pub preferences: Preferences,

    /// Configured scanners, in display order.
    #[serde(default)]
    pub devices: Vec<ScannerDeviceConfig>,
}

impl ScanlinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (scanlink.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::load_file(config_path)?;

        config.apply_env_overrides(|key| std::env::var(key).ok());

        config.validate()?;

        Ok(config)
    }

    /// Reads the config file alone: no environment overrides, no
    /// validation. A missing file yields the defaults.
    pub fn load_file(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let Some(path) = config_path.or_else(Self::default_config_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        info!(?path, "Loading config from file");
        let contents = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Writes `devices` into the config file and leaves every other setting
    /// as the file has it, so values that came from the environment are
    /// never persisted.
    pub fn save_devices(
        devices: Vec<ScannerDeviceConfig>,
        config_path: Option<PathBuf>,
    ) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        let mut on_disk = Self::load_file(Some(path.clone()))?;
        on_disk.devices = devices;
        on_disk.save(Some(path))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        // A blank URL means "not configured": offline mode, not an error.
        if let Some(raw) = self.remote.url.as_deref().filter(|u| !u.trim().is_empty()) {
            let parsed = url::Url::parse(raw.trim())?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with http:// or https://, got: {}",
                    raw
                )));
            }
        }

        if self.remote.table.trim().is_empty() {
            return Err(SyncError::InvalidConfig("remote.table must not be empty".into()));
        }

        if self.remote.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "remote.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.sync.backlog_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.backlog_interval_secs must be greater than 0".into(),
            ));
        }

        if self.scanners.poll_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "scanners.poll_interval_ms must be greater than 0".into(),
            ));
        }

        validate_device_list(&self.devices)
            .map_err(|e| SyncError::InvalidConfig(format!("devices: {}", e)))?;

        Ok(())
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// Each setting has a `SCANLINK_*` name and a legacy alias; the
    /// `SCANLINK_*` name wins when both are set.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |primary: &str, legacy: &str| lookup(primary).or_else(|| lookup(legacy));

        // An empty variable clears the setting.
        if let Some(url) = get("SCANLINK_REMOTE_URL", "SUPABASE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = non_blank(url);
        }

        if let Some(key) = get("SCANLINK_API_KEY", "SUPABASE_KEY") {
            debug!("Overriding remote API key from environment");
            self.remote.api_key = non_blank(key);
        }

        if let Some(raw) = get("SCANLINK_REMOTE_ENABLED", "DATABASE_ENABLED") {
            match parse_flag(&raw) {
                Some(enabled) => self.remote.enabled = enabled,
                None => warn!(value = %raw, "Ignoring unparseable remote switch in environment"),
            }
        }

        if let Some(raw) = get("SCANLINK_AUTO_SYNC", "AUTO_SYNC_ENABLED") {
            match parse_flag(&raw) {
                Some(enabled) => self.sync.auto_sync = enabled,
                None => warn!(value = %raw, "Ignoring unparseable auto-sync switch in environment"),
            }
        }

        if let Some(dir) = get("SCANLINK_DATA_DIR", "LOCAL_DATA_DIR") {
            debug!(dir = %dir, "Overriding data directory from environment");
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "scanlink", "scanlink")
            .map(|dirs| dirs.config_dir().join("scanlink.toml"))
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ScanlinkConfig::default();
        assert_eq!(config.remote.table, "barcode_scans");
        assert_eq!(config.remote.timeout_secs, 10);
        assert!(!config.remote.is_active());
        assert_eq!(config.scanners.duplicate_window_secs, 5);
        assert_eq!(config.scanners.max_reconnect_attempts, 3);
        assert_eq!(config.sync.backlog_interval_secs, 300);
        assert!(config.devices.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_with_legacy_names() {
        let mut config = ScanlinkConfig::default();
        config.apply_env_overrides(env(&[
            ("SUPABASE_URL", "https://legacy.example.com"),
            ("SCANLINK_REMOTE_URL", "https://primary.example.com"),
            ("SUPABASE_KEY", "k"),
            ("DATABASE_ENABLED", "false"),
            ("AUTO_SYNC_ENABLED", "0"),
            ("LOCAL_DATA_DIR", "/tmp/scans"),
        ]));

        assert_eq!(config.remote.url.as_deref(), Some("https://primary.example.com"));
        assert_eq!(config.remote.api_key.as_deref(), Some("k"));
        assert!(!config.remote.enabled);
        assert!(!config.remote.is_active());
        assert!(!config.sync.auto_sync);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/scans"));
    }

    #[test]
    fn test_blank_remote_url_means_offline() {
        let mut config = ScanlinkConfig::default();
        config.remote.url = Some("https://example.supabase.co".to_string());
        config.remote.api_key = Some("k".to_string());
        config.apply_env_overrides(env(&[("SUPABASE_URL", ""), ("SCANLINK_API_KEY", "  ")]));

        assert_eq!(config.remote.url, None);
        assert_eq!(config.remote.api_key, None);
        assert!(!config.remote.is_active());
        assert!(config.validate().is_ok());

        // Same for a blank value written in the file.
        let config: ScanlinkConfig = toml::from_str("[remote]\nurl = \"\"\n").unwrap();
        assert!(!config.remote.is_active());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_flag_is_ignored() {
        let mut config = ScanlinkConfig::default();
        config.apply_env_overrides(env(&[("SCANLINK_AUTO_SYNC", "maybe")]));
        assert!(config.sync.auto_sync);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScanlinkConfig::default();

        config.remote.url = Some("ftp://example.com".to_string());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.remote.url = Some("not a url".to_string());
        assert!(config.validate().unwrap_err().is_config_error());

        config.remote.url = Some("https://example.supabase.co".to_string());
        assert!(config.validate().is_ok());

        config.devices = vec![
            ScannerDeviceConfig::new("COM3"),
            ScannerDeviceConfig::new("COM3"),
        ];
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf/scanlink.toml");

        let mut config = ScanlinkConfig::default();
        config.remote.url = Some("https://example.supabase.co".to_string());
        config.storage.data_dir = dir.path().join("data");
        config.devices.push(ScannerDeviceConfig::new("COM3").with_baud_rate(115_200));
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[remote]"));
        assert!(contents.contains("[[devices]]"));

        let loaded: ScanlinkConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.devices, config.devices);
        assert_eq!(loaded.remote.url, config.remote.url);
    }

    #[test]
    fn test_save_devices_keeps_environment_out_of_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scanlink.toml");
        std::fs::write(
            &path,
            "[remote]\nurl = \"https://example.supabase.co\"\n\n[preferences]\nauto_connect = false\n",
        )
        .unwrap();

        let mut running = ScanlinkConfig::load_file(Some(path.clone())).unwrap();
        running.apply_env_overrides(env(&[("SUPABASE_KEY", "sk-secret-from-env")]));
        assert_eq!(running.remote.api_key.as_deref(), Some("sk-secret-from-env"));

        ScanlinkConfig::save_devices(vec![ScannerDeviceConfig::new("COM3")], Some(path.clone()))
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("sk-secret-from-env"));

        let saved = ScanlinkConfig::load_file(Some(path)).unwrap();
        assert_eq!(saved.devices, vec![ScannerDeviceConfig::new("COM3")]);
        assert_eq!(saved.remote.url.as_deref(), Some("https://example.supabase.co"));
        assert_eq!(saved.remote.api_key, None);
        assert!(!saved.preferences.auto_connect);
    }

    #[test]
    fn test_load_file_missing_is_default() {
        let dir = TempDir::new().unwrap();
        let config = ScanlinkConfig::load_file(Some(dir.path().join("absent.toml"))).unwrap();
        assert!(config.devices.is_empty());
        assert!(config.remote.url.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ScanlinkConfig = toml::from_str(
            r#"
            [preferences]
            auto_connect = false

            [[devices]]
            port = "/dev/ttyACM0"
            "#,
        )
        .unwrap();

        assert!(!config.preferences.auto_connect);
        assert!(config.preferences.sound_enabled);
        assert_eq!(config.devices[0].baud_rate, 9600);
        assert_eq!(config.scanners.poll_interval(), Duration::from_millis(10));
    }
}
