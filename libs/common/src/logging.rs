//! Unified logging for plug services
//!
//! Console output plus an optional daily-rolling file. Device wire traffic
//! (SOAP request/response bodies, logged under the [`WIRE_TARGET`] target) is
//! split into its own file so the main log stays readable.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{
    filter,
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Tracing target for raw device traffic
pub const WIRE_TARGET: &str = "device_wire";

/// Environment variable overriding the log root
pub const LOG_DIR_ENV: &str = "PLUGSRV_LOG_DIR";

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809Z [INFO] Scheduler started`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking writers flushing for the life of the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

// ============================================================================
// Log Root Directory Configuration
// ============================================================================

/// Priority: PLUGSRV_LOG_DIR env > config_dir > default "logs"
static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Initialize log root directory from config or environment
///
/// Call before [`init_with_config`]; later calls are ignored.
pub fn init_log_root(config_dir: Option<&str>) {
    LOG_ROOT.get_or_init(|| resolve_log_root(config_dir));
}

/// Configured log root, falling back to env or `logs`
pub fn get_log_root() -> PathBuf {
    LOG_ROOT
        .get()
        .cloned()
        .unwrap_or_else(|| resolve_log_root(None))
}

fn resolve_log_root(config_dir: Option<&str>) -> PathBuf {
    std::env::var(LOG_DIR_ENV)
        .ok()
        .filter(|dir| !dir.is_empty())
        .or_else(|| config_dir.map(str::to_string))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the file prefix and default filter target
    pub service_name: String,
    /// Base directory for logs
    pub log_dir: PathBuf,
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
    /// Write a daily-rolling file next to console output
    pub enable_file: bool,
    /// JSON lines instead of the bracketed text format in files
    pub enable_json: bool,
    /// Split device wire traffic into `{service}_wire.log`
    pub enable_wire_log: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "plugsrv".to_string(),
            log_dir: get_log_root(),
            level: Level::INFO,
            enable_file: true,
            enable_json: false,
            enable_wire_log: true,
        }
    }
}

impl LogConfig {
    /// Console-only logging for one-shot CLI commands
    pub fn console(service_name: &str, level: Level) -> Self {
        Self {
            service_name: service_name.to_string(),
            level,
            enable_file: false,
            enable_wire_log: false,
            ..Default::default()
        }
    }

    /// Filter directive used when `RUST_LOG` is unset
    ///
    /// Wire traffic stays off unless the level is debug or finer.
    pub fn default_filter(&self) -> String {
        let wire = if self.level >= Level::DEBUG { "debug" } else { "off" };
        format!(
            "{},{}={},{}={}",
            self.level.as_str().to_lowercase(),
            self.service_name.replace('-', "_"),
            self.level.as_str().to_lowercase(),
            WIRE_TARGET,
            wire
        )
    }
}

fn store_guard(guard: WorkerGuard) {
    let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
    match guards.lock() {
        Ok(mut guards) => guards.push(guard),
        Err(poisoned) => poisoned.into_inner().push(guard),
    }
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(env_str) if !env_str.is_empty() => EnvFilter::try_new(env_str)?,
        _ => EnvFilter::try_new(config.default_filter())?,
    };

    // Console gets everything except raw wire dumps
    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .with_filter(filter::filter_fn(|metadata| metadata.target() != WIRE_TARGET))
        .boxed();

    let file_layer = if config.enable_file {
        fs::create_dir_all(&config.log_dir)?;
        let appender = rolling::daily(&config.log_dir, format!("{}.log", config.service_name));
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        store_guard(guard);

        let layer = if config.enable_json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_target(true)
                .with_filter(filter::filter_fn(|metadata| metadata.target() != WIRE_TARGET))
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .with_filter(filter::filter_fn(|metadata| metadata.target() != WIRE_TARGET))
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    let wire_layer = if config.enable_file && config.enable_wire_log {
        let appender = rolling::daily(
            &config.log_dir,
            format!("{}_wire.log", config.service_name),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        store_guard(guard);

        Some(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .with_filter(filter::filter_fn(|metadata| metadata.target() == WIRE_TARGET))
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(wire_layer)
        .try_init()?;

    if config.enable_file {
        tracing::debug!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(&Level::WARN), "[WARN]");
        assert_eq!(format_level(&Level::TRACE), "[TRACE]");
    }

    #[test]
    fn test_resolve_log_root_prefers_config_over_default() {
        if std::env::var(LOG_DIR_ENV).is_ok() {
            return;
        }
        assert_eq!(resolve_log_root(Some("/var/log/plug")), PathBuf::from("/var/log/plug"));
        assert_eq!(resolve_log_root(None), PathBuf::from("logs"));
    }

    #[test]
    fn test_default_filter_gates_wire_traffic() {
        let info = LogConfig::console("plugsrv", Level::INFO);
        assert_eq!(info.default_filter(), "info,plugsrv=info,device_wire=off");

        let debug = LogConfig::console("plug-srv", Level::DEBUG);
        assert_eq!(
            debug.default_filter(),
            "debug,plug_srv=debug,device_wire=debug"
        );
        assert!(!debug.enable_file);
    }
}
