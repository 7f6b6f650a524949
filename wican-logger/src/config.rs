//! Configuration management
//!
//! Handles:
//! - Device address / port / endpoint
//! - Discovery candidate lists, timeouts and worker counts
//! - Poll interval and failure threshold
//! - Output location and display mode
//!
//! The config is read once at startup and passed by value to each component.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::address::{Address, Subnet};

/// Env var pointing at an explicit config file
pub const CONFIG_ENV: &str = "WICAN_LOGGER_CONFIG";
/// Env var overriding `device.address`
pub const ADDRESS_ENV: &str = "WICAN_IP";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub device: DeviceConfig,
    pub discovery: DiscoveryConfig,
    pub polling: PollingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Known device IPv4 (`a.b.c.d` or `a.b.c.d:port`); skips discovery at start
    pub address: Option<String>,
    pub port: u16,
    pub endpoint_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub hostnames: Vec<String>,
    pub known_addresses: Vec<String>,
    /// Empty means auto-detect from local interfaces
    pub subnets: Vec<String>,
    pub fallback_subnets: Vec<String>,
    pub hostname_timeout_ms: u64,
    pub known_address_timeout_ms: u64,
    pub known_address_workers: usize,
    pub subnet_timeout_ms: u64,
    pub subnet_workers: usize,
    pub manual_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub fetch_timeout_ms: u64,
    pub failure_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub display: DisplayMode,
}

/// Console rendering of each captured record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    All,
    Compact,
    Key,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: 80,
            endpoint_path: "/autopid_data".to_string(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            hostnames: vec!["wican.local".to_string(), "wican".to_string()],
            known_addresses: [
                "192.168.8.102", // WiCAN AP mode
                "192.168.4.1",   // ESP32 AP default
                "192.168.1.100",
                "192.168.1.102",
                "192.168.0.100",
                "192.168.0.102",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            subnets: Vec::new(),
            fallback_subnets: ["192.168.1", "192.168.0", "192.168.8", "10.0.0"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            hostname_timeout_ms: 2000,
            known_address_timeout_ms: 1000,
            known_address_workers: 10,
            subnet_timeout_ms: 500,
            subnet_workers: 50,
            manual_timeout_ms: 3000,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            fetch_timeout_ms: 5000,
            failure_threshold: 3,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_prefix: "wican_log".to_string(),
            display: DisplayMode::All,
        }
    }
}

impl LoggerConfig {
    /// Load config from `$WICAN_LOGGER_CONFIG` or the OS config dir, then apply env overrides
    pub async fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(explicit) => PathBuf::from(explicit),
            None => Self::config_file_path()?,
        };

        let mut config = Self::load_from(&path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file; a missing file yields the defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(content)?)
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("wican-logger");
        path.push("config.toml");
        Ok(path)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(address) = std::env::var(ADDRESS_ENV) {
            let address = address.trim();
            if !address.is_empty() {
                self.device.address = Some(address.to_string());
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.port == 0 {
            bail!("device.port must be non-zero");
        }
        if !self.device.endpoint_path.starts_with('/') {
            bail!("device.endpoint_path must start with '/'");
        }
        if self.polling.interval_ms == 0 {
            bail!("polling.interval_ms must be non-zero");
        }
        if self.polling.failure_threshold == 0 {
            bail!("polling.failure_threshold must be at least 1");
        }
        if self.discovery.known_address_workers == 0 || self.discovery.subnet_workers == 0 {
            bail!("discovery worker counts must be at least 1");
        }

        self.target_address()?;
        self.known_addresses()?;
        self.configured_subnets()?;
        self.fallback_subnets()?;
        Ok(())
    }

    /// The configured device address, if any
    pub fn target_address(&self) -> Result<Option<Address>> {
        self.device
            .address
            .as_deref()
            .map(|raw| {
                Address::parse_ipv4(raw, self.device.port).context("Invalid device.address")
            })
            .transpose()
    }

    /// Phase 2 candidates; the configured target (if any) goes first
    pub fn known_addresses(&self) -> Result<Vec<Address>> {
        let mut addresses = Vec::new();
        if let Some(target) = self.target_address()? {
            addresses.push(target);
        }

        for raw in &self.discovery.known_addresses {
            let address = Address::parse_ipv4(raw, self.device.port)
                .with_context(|| format!("Invalid entry in discovery.known_addresses: {raw}"))?;
            if !addresses.contains(&address) {
                addresses.push(address);
            }
        }
        Ok(addresses)
    }

    /// Explicit subnets, or `None` to auto-detect
    pub fn configured_subnets(&self) -> Result<Option<Vec<Subnet>>> {
        if self.discovery.subnets.is_empty() {
            return Ok(None);
        }
        parse_subnets(&self.discovery.subnets, "discovery.subnets").map(Some)
    }

    pub fn fallback_subnets(&self) -> Result<Vec<Subnet>> {
        parse_subnets(&self.discovery.fallback_subnets, "discovery.fallback_subnets")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.polling.fetch_timeout_ms)
    }

    pub fn manual_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery.manual_timeout_ms)
    }
}

fn parse_subnets(raw: &[String], field: &str) -> Result<Vec<Subnet>> {
    raw.iter()
        .map(|s| {
            s.parse::<Subnet>()
                .with_context(|| format!("Invalid entry in {field}: {s}"))
        })
        .collect()
}
