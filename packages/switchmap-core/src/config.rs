use crate::discovery::DiscoverySettings;
use crate::inventory::{ConfigError, CoreSwitchConfig, Inventory};
use crate::snmp::{SessionOptions, SnmpAuth};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
const ENV_CONFIG_PATH: &str = "SWITCHMAP_CONFIG";

const DEFAULT_COOLDOWN_MINUTES: u64 = 15;

/// Whole configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub snmp: SnmpConfig,
    pub discovery: DiscoveryConfig,
    pub storage: StorageConfig,
    pub core_switches: Vec<CoreSwitchConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnmpConfig {
    pub port: u16,
    pub timeout_secs: u64,
    /// Credentials for access switches
    pub switch_auth: SnmpAuth,
    /// Credentials for core devices
    pub core_auth: SnmpAuth,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            port: 161,
            timeout_secs: 5,
            switch_auth: SnmpAuth::default(),
            core_auth: SnmpAuth::default(),
        }
    }
}

impl SnmpConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            port: self.port,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// VLAN whose forwarding entries are ignored; 0 disables the filter
    pub skip_vlan: u32,
    /// Minimum time between the starts of two passes
    pub cooldown_minutes: u64,
    /// Pass interval of the daemon
    pub interval_minutes: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            skip_vlan: 1,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            interval_minutes: DEFAULT_COOLDOWN_MINUTES,
        }
    }
}

impl DiscoveryConfig {
    pub fn settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            skip_vlan: (self.skip_vlan != 0).then_some(self.skip_vlan),
        }
    }

    /// Cooldown between pass starts; rejects values chrono cannot represent
    pub fn cooldown(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.cooldown_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .ok_or(ConfigError::OutOfRange {
                field: "discovery.cooldown_minutes",
                value: self.cooldown_minutes,
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory file; defaults to the platform data dir
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn inventory(&self) -> Result<Inventory, ConfigError> {
        Inventory::new(self.core_switches.clone())
    }
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// File named by the environment variable
    Environment(PathBuf),
    /// File at the standard location
    ConfigFile(PathBuf),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment(path) => {
                write!(f, "{} ({})", ENV_CONFIG_PATH, path.display())
            }
            ConfigSource::ConfigFile(path) => write!(f, "config file ({})", path.display()),
        }
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("switchmap").join("config.toml"))
}

/// Parse one config file. Unlike a missing file, a malformed one is an error.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;

    tracing::debug!(
        "Loaded config from {:?}: {} core devices",
        path,
        config.core_switches.len()
    );
    Ok(config)
}

/// Load configuration with priority:
/// 1. File named by SWITCHMAP_CONFIG
/// 2. Config file (~/.config/switchmap/config.toml)
/// 3. Default values
pub fn load_config() -> Result<(Config, ConfigSource)> {
    // Priority 1: Environment variable
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(path.trim());
        if !path.as_os_str().is_empty() {
            tracing::info!("Using config file from environment variable: {:?}", path);
            let config = load_config_from(&path)?;
            return Ok((config, ConfigSource::Environment(path)));
        }
    }

    // Priority 2: Config file
    if let Some(path) = get_config_file_path().filter(|p| p.exists()) {
        tracing::info!("Using config file: {:?}", path);
        let config = load_config_from(&path)?;
        return Ok((config, ConfigSource::ConfigFile(path)));
    }

    // Priority 3: Default values
    tracing::debug!("No config file found, using defaults");
    Ok((Config::default(), ConfigSource::Default))
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/switchmap/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Switchmap Configuration
# Place this file at: ~/.config/switchmap/config.toml
# or point SWITCHMAP_CONFIG at it.

[snmp]
port = 161
timeout_secs = 5

# Access switches: SNMPv2c community
[snmp.switch_auth]
version = "v2c"
community = "public"

# Core devices: SNMPv3 USM (SHA authentication, AES-128 privacy)
[snmp.core_auth]
version = "v3"
username = "poller"
auth_key = "change-me"
priv_key = "change-me"

[discovery]
# Forwarding entries on this VLAN are ignored (0 disables)
skip_vlan = 1
# Minimum minutes between two discovery passes
cooldown_minutes = 15
# Minutes between passes in daemon mode
interval_minutes = 15

[storage]
# Default: <data dir>/switchmap/directory.json
# path = "/var/lib/switchmap/directory.json"

[[core_switches]]
address = "10.0.0.254"
# oid = "1.3.6.1.2.1.4.22.1.2"

[[core_switches.switches]]
address = "10.0.0.1"
# oid = "1.3.6.1.2.1.17.7.1.2.2.1.2"
# Uplink ports end the forwarding-table walk
excluded_ports = [25, 26]

[[core_switches.switches]]
address = "10.0.0.2"
"#
    .to_string()
}
