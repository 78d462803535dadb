use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_full_scan_interval")]
    pub full_scan_interval_secs: u64,
    #[serde(default = "default_targeted_scan_interval")]
    pub targeted_scan_interval_secs: u64,
    #[serde(default = "default_lock_wait_log")]
    pub lock_wait_log_secs: u64,
    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where principals come from and which ones count as infrastructure.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default = "default_system_accounts")]
    pub system_accounts: Vec<String>,
    #[serde(default = "default_system_prefixes")]
    pub system_prefixes: Vec<String>,
}

/// Logger settings. `TRACING_LEVEL` and `LOG_FILE_PATH` still win over
/// these when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `info,acl_inventory::scanner::walk=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file_path")]
    pub file_path: String,
    #[serde(default)]
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Daily,
    Hourly,
}

fn default_database_path() -> String {
    "acl_inventory.db".to_string()
}

fn default_full_scan_interval() -> u64 {
    60
}

fn default_targeted_scan_interval() -> u64 {
    15
}

fn default_lock_wait_log() -> u64 {
    5
}

// MAX_PATH minus room for an 8.3 file name
fn default_max_path_length() -> usize {
    248
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file_path() -> String {
    "./logs/acl-inventory.log".to_string()
}

fn default_system_accounts() -> Vec<String> {
    vec!["Administrators".to_string()]
}

fn default_system_prefixes() -> Vec<String> {
    vec!["Domain ".to_string()]
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            system_accounts: default_system_accounts(),
            system_prefixes: default_system_prefixes(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_path: default_log_file_path(),
            rotation: LogRotation::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            full_scan_interval_secs: default_full_scan_interval(),
            targeted_scan_interval_secs: default_targeted_scan_interval(),
            lock_wait_log_secs: default_lock_wait_log(),
            max_path_length: default_max_path_length(),
            identity: IdentityConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn full_scan_interval(&self) -> Duration {
        Duration::from_secs(self.full_scan_interval_secs)
    }

    pub fn targeted_scan_interval(&self) -> Duration {
        Duration::from_secs(self.targeted_scan_interval_secs)
    }

    pub fn lock_wait_log_interval(&self) -> Duration {
        Duration::from_secs(self.lock_wait_log_secs.max(1))
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_configuration_from("Config")
}

/// Reads `<name>.toml` (optional) and then `ACL_INVENTORY_*` environment
/// overrides, e.g. `ACL_INVENTORY_DATABASE_PATH` or
/// `ACL_INVENTORY_IDENTITY__SOURCE_PATH`.
pub fn load_configuration_from(name: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(name).required(false))
        .add_source(
            Environment::with_prefix("ACL_INVENTORY")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
