//! Shared plumbing for plug services
//!
//! - logging setup (console, daily files, device wire log)
//! - graceful shutdown signals
//! - common command-line arguments

pub mod bootstrap_args;
pub mod logging;
pub mod shutdown;

pub use bootstrap_args::{parse_log_level, ServiceArgs};
pub use logging::{init_log_root, init_with_config, LogConfig, WIRE_TARGET};
pub use shutdown::{notify_on_shutdown, wait_for_shutdown};

// Re-export common dependencies
pub use tokio;

// Re-export CLI dependencies when cli feature is enabled
#[cfg(feature = "cli")]
pub use clap;
