//! plugsrv configuration
//!
//! Layered with figment: built-in defaults, then a YAML/TOML/JSON file picked
//! by extension, then `PLUGSRV_*` environment variables (`__` separates
//! nested keys, e.g. `PLUGSRV_DEVICE__HOST`).

use crate::client::DeviceActionClient;
use crate::endpoint::{Endpoint, DEFAULT_PORT};
use crate::error::{PlugSrvError, Result};
use crate::resolver::{RulesPortResolver, DEFAULT_RULES_PORTS};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "PLUGSRV_";

// ============================================================================
// Sections
// ============================================================================

/// Target plug
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: String,
    /// Basic-control port
    pub port: u16,
    /// Initial rules port; defaults to `port`
    pub rules_port: Option<u16>,
    pub rules_port_candidates: Vec<u16>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            rules_port: None,
            rules_port_candidates: DEFAULT_RULES_PORTS.to_vec(),
            timeout_secs: 15,
        }
    }
}

impl DeviceConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port).with_rules_port(self.rules_port.unwrap_or(self.port))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn build_client(&self) -> Result<DeviceActionClient> {
        Ok(DeviceActionClient::new(self.endpoint(), self.timeout())?
            .with_resolver(RulesPortResolver::new(self.rules_port_candidates.clone())))
    }
}

/// Local scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Off by default: the device normally runs its own rules
    pub enabled: bool,
    pub tick_secs: u64,
    /// Fixed UTC offset for "now"; local time when unset
    pub utc_offset_minutes: Option<i32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_secs: 15,
            utc_offset_minutes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Proxy the device's own rules database
    Device,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Device,
            sqlite_path: "data/schedules.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<String>,
    pub level: Option<String>,
}

// ============================================================================
// AppConfig
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Defaults, optional file, then environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(PlugSrvError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
            figment = match extension {
                "json" => figment.merge(Json::file(path)),
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                other => {
                    return Err(PlugSrvError::Config(format!(
                        "Unsupported config format: '{}'",
                        other
                    )))
                },
            };
        }

        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Check configuration completeness
    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            return Err(PlugSrvError::Config("device.host is required".to_string()));
        }
        if self.device.port == 0 || self.device.rules_port == Some(0) {
            return Err(PlugSrvError::Config("device ports must be non-zero".to_string()));
        }
        if self.device.rules_port_candidates.is_empty() {
            return Err(PlugSrvError::Config(
                "device.rules_port_candidates must not be empty".to_string(),
            ));
        }
        if self.device.rules_port_candidates.contains(&0) {
            return Err(PlugSrvError::Config(
                "device.rules_port_candidates must not contain 0".to_string(),
            ));
        }
        if self.device.timeout_secs == 0 {
            return Err(PlugSrvError::Config("device.timeout_secs must be > 0".to_string()));
        }
        if !(1..=59).contains(&self.scheduler.tick_secs) {
            return Err(PlugSrvError::Config(format!(
                "scheduler.tick_secs must be between 1 and 59, got {}",
                self.scheduler.tick_secs
            )));
        }
        if let Some(offset) = self.scheduler.utc_offset_minutes {
            if offset.abs() >= 24 * 60 {
                return Err(PlugSrvError::Config(format!(
                    "scheduler.utc_offset_minutes out of range: {}",
                    offset
                )));
            }
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.sqlite_path.trim().is_empty() {
            return Err(PlugSrvError::Config("store.sqlite_path is required".to_string()));
        }
        Ok(())
    }
}
