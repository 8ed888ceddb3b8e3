//! plugsrv - smart plug control over UPnP/SOAP
//!
//! ```text
//! caller ──▶ DeviceActionClient ──▶ SoapTransport ──HTTP──▶ plug
//!                 │    ▲
//!   connect error │    │ adopted port
//!                 ▼    │
//!            RulesPortResolver
//!
//! SchedulerRunner ──tick──▶ ScheduleEvaluator ──▶ DeviceActionClient.set_state
//!        │
//!        └── ScheduleStore (device | sqlite | memory)
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod resolver;
pub mod runtime;
pub mod soap;
pub mod store;

pub use client::{DeviceActionClient, DeviceInfo, PowerState};
pub use config::{AppConfig, DeviceConfig, SchedulerConfig, StoreBackend, StoreConfig};
pub use endpoint::{Endpoint, Service, DEFAULT_PORT};
pub use error::{PlugSrvError, Result, TransportError};
pub use resolver::{RulesPortResolver, DEFAULT_RULES_PORTS};
pub use runtime::{ScheduleClock, SchedulerRunner};
pub use soap::SoapTransport;
pub use store::{open_store, DeviceScheduleStore};
