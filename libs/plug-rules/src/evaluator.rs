//! Local schedule evaluation
//!
//! Drives a device from a stored [`Schedule`] when the device's own rule
//! engine is not trusted. The evaluator is meant to be ticked every 10-15
//! seconds by a single timer; a per-minute watermark makes repeated ticks in
//! the same minute no-ops, so each minute is evaluated at most once.
//!
//! ```text
//! timer ──tick(now)──▶ watermark check ──▶ due rules ──last wins──▶ SwitchActuator
//! ```

use crate::types::{Rule, RuleAction, Schedule};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Timelike};
use errors::ServiceResult;
use tracing::{debug, info, warn};

/// Anything that can switch the plug
#[async_trait]
pub trait SwitchActuator: Send + Sync {
    /// Apply `action`; returns the power state the device reports afterwards
    async fn apply(&self, action: RuleAction) -> ServiceResult<bool>;
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Same minute as the previous tick; nothing evaluated
    Debounced,
    /// Schedule globally disabled; watermark advanced, no rules checked
    ScheduleDisabled,
    /// No rule due this minute
    Idle,
    /// The winning rule's action was applied
    Applied {
        rule_id: String,
        action: RuleAction,
        confirmed_on: bool,
    },
    /// The winning rule's action failed; the error was logged and dropped
    Failed {
        rule_id: String,
        action: RuleAction,
        error: String,
    },
}

/// Per-minute schedule evaluator
#[derive(Debug, Default)]
pub struct ScheduleEvaluator {
    watermark: Option<NaiveDateTime>,
}

impl ScheduleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last minute that was evaluated
    pub fn watermark(&self) -> Option<NaiveDateTime> {
        self.watermark
    }

    /// Evaluate `schedule` at local time `now`
    ///
    /// Never fails: actuator errors are reported as [`TickOutcome::Failed`]
    /// so the periodic driver keeps running.
    pub async fn tick(
        &mut self,
        now: NaiveDateTime,
        schedule: &Schedule,
        actuator: &dyn SwitchActuator,
    ) -> TickOutcome {
        let minute = truncate_to_minute(now);
        if self.watermark == Some(minute) {
            return TickOutcome::Debounced;
        }
        self.watermark = Some(minute);

        if !schedule.enabled {
            debug!("Schedule for {} disabled, skipping {}", schedule.device, minute);
            return TickOutcome::ScheduleDisabled;
        }

        let Some(rule) = due_rule(schedule, &now) else {
            return TickOutcome::Idle;
        };

        let action = rule.action;
        match actuator.apply(action).await {
            Ok(confirmed_on) => {
                info!(
                    "Rule {} applied '{}' to {} at {}",
                    rule.id,
                    action,
                    schedule.device,
                    minute.format("%a %H:%M")
                );
                TickOutcome::Applied {
                    rule_id: rule.id.clone(),
                    action,
                    confirmed_on,
                }
            },
            Err(e) => {
                warn!(
                    "Rule {} failed to apply '{}' [{}]: {}",
                    rule.id,
                    action,
                    e.error_code(),
                    e
                );
                TickOutcome::Failed {
                    rule_id: rule.id.clone(),
                    action,
                    error: e.to_string(),
                }
            },
        }
    }
}

/// Last rule in schedule order that is due at `now`
pub fn due_rule<'a>(schedule: &'a Schedule, now: &NaiveDateTime) -> Option<&'a Rule> {
    schedule.rules.iter().rev().find(|rule| rule.is_due_now(now))
}

fn truncate_to_minute(now: NaiveDateTime) -> NaiveDateTime {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::types::{TimeEvent, WeekdaySet};
    use chrono::NaiveDate;
    use errors::ServiceError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingActuator {
        calls: Mutex<Vec<RuleAction>>,
        fail: bool,
    }

    #[async_trait]
    impl SwitchActuator for RecordingActuator {
        async fn apply(&self, action: RuleAction) -> ServiceResult<bool> {
            self.calls.lock().unwrap().push(action);
            if self.fail {
                return Err(ServiceError::ConnectionFailed {
                    endpoint: "10.0.0.5:49153".to_string(),
                    reason: "refused".to_string(),
                });
            }
            Ok(action == RuleAction::On)
        }
    }

    fn monday(h: u32, m: u32, s: u32) -> NaiveDateTime {
        // 2024-01-01 is a Monday
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn rule(id: &str, action: RuleAction, hour: u8, minute: u8, days: &[&str]) -> Rule {
        Rule::new(
            action,
            TimeEvent { hour, minute },
            WeekdaySet::from_names(days).unwrap(),
        )
        .with_id(id)
    }

    fn schedule(rules: Vec<Rule>) -> Schedule {
        let mut s = Schedule::new("10.0.0.5");
        s.rules = rules;
        s
    }

    #[tokio::test]
    async fn test_last_rule_wins() {
        let s = schedule(vec![
            rule("a", RuleAction::On, 8, 0, &["Mon"]),
            rule("b", RuleAction::Off, 8, 0, &["Mon"]),
        ]);
        let actuator = RecordingActuator::default();
        let mut evaluator = ScheduleEvaluator::new();

        let outcome = evaluator.tick(monday(8, 0, 5), &s, &actuator).await;
        assert_eq!(
            outcome,
            TickOutcome::Applied {
                rule_id: "b".to_string(),
                action: RuleAction::Off,
                confirmed_on: false,
            }
        );
        assert_eq!(*actuator.calls.lock().unwrap(), vec![RuleAction::Off]);
    }

    #[tokio::test]
    async fn test_same_minute_is_debounced() {
        let s = schedule(vec![rule("a", RuleAction::On, 8, 0, &["Mon"])]);
        let actuator = RecordingActuator::default();
        let mut evaluator = ScheduleEvaluator::new();

        evaluator.tick(monday(8, 0, 1), &s, &actuator).await;
        let second = evaluator.tick(monday(8, 0, 50), &s, &actuator).await;

        assert_eq!(second, TickOutcome::Debounced);
        assert_eq!(actuator.calls.lock().unwrap().len(), 1);
        assert_eq!(evaluator.watermark(), Some(monday(8, 0, 0)));
    }

    #[tokio::test]
    async fn test_skipped_minute_misses_rule() {
        let s = schedule(vec![rule("a", RuleAction::On, 8, 0, &["Mon"])]);
        let actuator = RecordingActuator::default();
        let mut evaluator = ScheduleEvaluator::new();

        assert_eq!(
            evaluator.tick(monday(7, 59, 50), &s, &actuator).await,
            TickOutcome::Idle
        );
        assert_eq!(
            evaluator.tick(monday(8, 1, 5), &s, &actuator).await,
            TickOutcome::Idle
        );
        assert!(actuator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_schedule_advances_watermark() {
        let mut s = schedule(vec![rule("a", RuleAction::On, 8, 0, &["Mon"])]);
        s.enabled = false;
        let actuator = RecordingActuator::default();
        let mut evaluator = ScheduleEvaluator::new();

        assert_eq!(
            evaluator.tick(monday(8, 0, 0), &s, &actuator).await,
            TickOutcome::ScheduleDisabled
        );
        s.enabled = true;
        // Minute already consumed
        assert_eq!(
            evaluator.tick(monday(8, 0, 30), &s, &actuator).await,
            TickOutcome::Debounced
        );
        assert!(actuator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_actuator_error_is_swallowed() {
        let s = schedule(vec![rule("a", RuleAction::On, 8, 0, &["Mon"])]);
        let actuator = RecordingActuator {
            fail: true,
            ..Default::default()
        };
        let mut evaluator = ScheduleEvaluator::new();

        let outcome = evaluator.tick(monday(8, 0, 0), &s, &actuator).await;
        assert!(matches!(outcome, TickOutcome::Failed { ref rule_id, .. } if rule_id == "a"));
        // Next minute keeps running
        assert_eq!(
            evaluator.tick(monday(8, 1, 0), &s, &actuator).await,
            TickOutcome::Idle
        );
    }

    #[tokio::test]
    async fn test_wrong_weekday_and_disabled_rule() {
        let mut disabled = rule("b", RuleAction::Off, 8, 0, &["Mon"]);
        disabled.enabled = false;
        let s = schedule(vec![rule("a", RuleAction::On, 8, 0, &["Tue"]), disabled]);
        let actuator = RecordingActuator::default();
        let mut evaluator = ScheduleEvaluator::new();

        assert_eq!(
            evaluator.tick(monday(8, 0, 0), &s, &actuator).await,
            TickOutcome::Idle
        );
    }
}
