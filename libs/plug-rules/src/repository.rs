//! Schedule persistence
//!
//! `ScheduleStore` is the seam between schedule sources and their consumers.
//! Two local backends live here; the device-backed store (which proxies the
//! plug's own rules database) is provided by the service crate.

use crate::error::Result;
use crate::types::Schedule;
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Load/save schedules keyed by device address
///
/// Loading a device with nothing stored yields an empty, enabled schedule.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn load(&self, device: &str) -> Result<Schedule>;

    /// Validates before persisting; an invalid schedule is never stored
    async fn save(&self, schedule: &Schedule) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store, mainly for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    schedules: DashMap<String, Schedule>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn load(&self, device: &str) -> Result<Schedule> {
        Ok(self
            .schedules
            .get(device)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| Schedule::new(device)))
    }

    async fn save(&self, schedule: &Schedule) -> Result<()> {
        schedule.validate()?;
        self.schedules
            .insert(schedule.device.clone(), schedule.clone());
        Ok(())
    }
}

// ============================================================================
// SQLite store
// ============================================================================

/// One JSON document per device in a `schedules` table
#[derive(Debug, Clone)]
pub struct SqliteScheduleStore {
    pool: SqlitePool,
}

impl SqliteScheduleStore {
    /// Wrap an existing pool and make sure the table exists
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Open (creating if needed) a database file
    pub async fn open(path: &str) -> Result<Self> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path)
        };
        let pool = SqlitePool::connect(&url).await?;
        Self::new(pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Every stored device address
    pub async fn list_devices(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT device FROM schedules ORDER BY device ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("device").map_err(Into::into))
            .collect()
    }

    /// Remove a device's schedule; returns whether a row existed
    pub async fn delete(&self, device: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM schedules WHERE device = ?")
            .bind(device)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            device TEXT PRIMARY KEY,
            enabled INTEGER NOT NULL DEFAULT 1,
            schedule_json TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn load(&self, device: &str) -> Result<Schedule> {
        let row = sqlx::query("SELECT schedule_json FROM schedules WHERE device = ?")
            .bind(device)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.try_get("schedule_json")?;
                let mut schedule: Schedule = serde_json::from_str(&json)?;
                schedule.device = device.to_string();
                Ok(schedule)
            },
            None => {
                debug!("No stored schedule for {}, using empty", device);
                Ok(Schedule::new(device))
            },
        }
    }

    async fn save(&self, schedule: &Schedule) -> Result<()> {
        schedule.validate()?;
        let json = serde_json::to_string(schedule)?;

        sqlx::query(
            r#"
            INSERT INTO schedules (device, enabled, schedule_json, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(device) DO UPDATE SET
                enabled = excluded.enabled,
                schedule_json = excluded.schedule_json,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&schedule.device)
        .bind(schedule.enabled)
        .bind(&json)
        .execute(&self.pool)
        .await?;

        debug!(
            "Saved schedule for {} ({} rules)",
            schedule.device,
            schedule.rules.len()
        );
        Ok(())
    }
}
