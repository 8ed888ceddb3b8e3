//! Plug Rules - schedule model and rule translation for smart plugs
//!
//! Provides:
//! - Schedule/Rule value types with validation
//! - Translation between vendor rule XML and schedules
//! - A per-minute local evaluator for driving a plug from a schedule
//! - Schedule stores (in-memory, SQLite)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  parse/write  ┌──────────────┐
//! │ rules XML   │◀─────────────▶│  Translator  │
//! └─────────────┘               └──────┬───────┘
//!                                      ▼
//! ┌─────────────┐  load/save    ┌──────────────┐  tick   ┌─────────────┐
//! │ScheduleStore│◀─────────────▶│   Schedule   │────────▶│  Evaluator  │──▶ SwitchActuator
//! └─────────────┘               └──────────────┘         └─────────────┘
//! ```

mod error;
mod evaluator;
mod repository;
pub mod translator;
pub mod types;
pub mod xml;

// Re-export public API
pub use error::{Result, RuleError};
pub use evaluator::{due_rule, ScheduleEvaluator, SwitchActuator, TickOutcome};
pub use repository::{MemoryScheduleStore, ScheduleStore, SqliteScheduleStore};
pub use translator::{infer_enabled, normalize_day_token, parse_rules, parse_schedule, write_schedule};

pub use types::{
    new_rule_id, parse_weekday_abbrev, weekday_abbrev, Rule, RuleAction, Schedule, TimeEvent,
    WeekdaySet, WEEKDAY_NAMES,
};
