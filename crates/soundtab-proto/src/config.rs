use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub popup: PopupConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Retention and eviction of no-longer-audible tabs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a tab stays listed after it stops producing sound.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Period of the background eviction sweep.
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

/// Bounds on calls into the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Upper bound for a single call into a tab's page context.
    #[serde(default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,
    /// Upper bound for a whole popup command (a skip may take several page calls).
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Tabs injected concurrently during the startup scan.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopupConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_popup_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            page_timeout_ms: default_page_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            scan_batch_size: default_scan_batch_size(),
        }
    }
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_popup_port(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
            port: default_http_port(),
        }
    }
}

impl CacheConfig {
    /// Retention window.  Values too large to represent saturate.
    pub fn retention(&self) -> chrono::Duration {
        i64::try_from(self.retention_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs.max(1))
    }
}

impl HostConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

fn default_retention_secs() -> u64 {
    30 * 60
}

fn default_eviction_interval_secs() -> u64 {
    60
}

fn default_page_timeout_ms() -> u64 {
    5_000
}

fn default_command_timeout_ms() -> u64 {
    15_000
}

fn default_scan_batch_size() -> usize {
    8
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_popup_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_http_port() -> u16 {
    8990
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Read `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
