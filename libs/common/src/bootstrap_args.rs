//! Common command-line arguments for plug tools
//!
//! Flattened into each binary's own clap parser.

#[cfg(feature = "cli")]
use clap::Args;
use std::path::PathBuf;

/// Startup arguments shared by every command
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "cli", derive(Args))]
pub struct ServiceArgs {
    /// Configuration file (yaml, toml or json)
    #[cfg_attr(feature = "cli", arg(short = 'c', long, global = true, env = "PLUGSRV_CONFIG"))]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[cfg_attr(feature = "cli", arg(short = 'l', long, global = true))]
    pub log_level: Option<String>,

    /// Also write logs to files under the log directory
    #[cfg_attr(feature = "cli", arg(long, global = true))]
    pub log_to_file: bool,
}

impl ServiceArgs {
    /// Effective level: command line, then `fallback`, then INFO
    pub fn effective_log_level(&self, fallback: Option<&str>) -> tracing::Level {
        self.log_level
            .as_deref()
            .or(fallback)
            .map(parse_log_level)
            .unwrap_or(tracing::Level::INFO)
    }

    /// Parse log level string to tracing::Level
    pub fn parse_log_level(&self) -> tracing::Level {
        self.effective_log_level(None)
    }

    /// Check if running with verbose output
    pub fn is_verbose(&self) -> bool {
        matches!(self.parse_log_level(), tracing::Level::DEBUG | tracing::Level::TRACE)
    }
}

/// Lenient level parser; unknown names fall back to INFO
pub fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = ServiceArgs::default();
        assert!(args.log_level.is_none());
        assert_eq!(args.parse_log_level(), tracing::Level::INFO);
        assert!(args.config.is_none());
        assert!(!args.log_to_file);
    }

    #[test]
    fn test_parse_log_level() {
        let args = ServiceArgs {
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        assert_eq!(args.parse_log_level(), tracing::Level::DEBUG);
        assert_eq!(args.effective_log_level(Some("error")), tracing::Level::DEBUG);
        assert!(args.is_verbose());

        let args = ServiceArgs::default();
        assert_eq!(args.effective_log_level(Some("warn")), tracing::Level::WARN);

        assert_eq!(parse_log_level("WARN"), tracing::Level::WARN);
        assert_eq!(parse_log_level("invalid"), tracing::Level::INFO);
    }
}
