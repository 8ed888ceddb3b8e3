//! Schedule store selection and the device-backed store

use crate::client::DeviceActionClient;
use crate::config::{StoreBackend, StoreConfig};
use crate::error::{PlugSrvError, Result};
use async_trait::async_trait;
use plug_rules::{MemoryScheduleStore, RuleError, Schedule, ScheduleStore, SqliteScheduleStore};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Proxies the plug's own rules database
///
/// Only serves the device the client points at.
pub struct DeviceScheduleStore {
    client: Arc<DeviceActionClient>,
}

impl DeviceScheduleStore {
    pub fn new(client: Arc<DeviceActionClient>) -> Self {
        Self { client }
    }

    fn check_device(&self, device: &str) -> plug_rules::Result<()> {
        if device.trim().is_empty() || device.eq_ignore_ascii_case(self.client.host()) {
            return Ok(());
        }
        Err(RuleError::validation(format!(
            "device store for '{}' cannot serve '{}'",
            self.client.host(),
            device
        )))
    }
}

#[async_trait]
impl ScheduleStore for DeviceScheduleStore {
    async fn load(&self, device: &str) -> plug_rules::Result<Schedule> {
        self.check_device(device)?;
        Ok(self.client.get_device_schedule().await?)
    }

    async fn save(&self, schedule: &Schedule) -> plug_rules::Result<()> {
        self.check_device(&schedule.device)?;
        self.client.set_device_schedule(schedule).await?;
        Ok(())
    }
}

/// Build the configured store
pub async fn open_store(
    config: &StoreConfig,
    client: Arc<DeviceActionClient>,
) -> Result<Arc<dyn ScheduleStore>> {
    let store: Arc<dyn ScheduleStore> = match config.backend {
        StoreBackend::Device => Arc::new(DeviceScheduleStore::new(client)),
        StoreBackend::Memory => Arc::new(MemoryScheduleStore::new()),
        StoreBackend::Sqlite => {
            if let Some(parent) = Path::new(&config.sqlite_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        PlugSrvError::Store(format!("Cannot create {}: {}", parent.display(), e))
                    })?;
                }
            }
            Arc::new(SqliteScheduleStore::open(&config.sqlite_path).await?)
        },
    };
    info!("Schedule store: {:?}", config.backend);
    Ok(store)
}

/// Load, bind to `host`, and save back with the global flag changed
pub async fn set_store_enabled(
    store: &dyn ScheduleStore,
    host: &str,
    enabled: bool,
) -> Result<Schedule> {
    let mut schedule = store.load(host).await?;
    schedule.bind_device(host)?;
    schedule.enabled = enabled;
    store.save(&schedule).await?;
    Ok(schedule)
}
