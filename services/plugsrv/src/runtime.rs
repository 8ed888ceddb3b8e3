//! Local scheduler runtime
//!
//! Drives [`ScheduleEvaluator`] from a tokio interval. The schedule is
//! reloaded from the store every tick so edits take effect without a
//! restart; load failures skip the tick and never stop the loop.

use crate::client::{DeviceActionClient, PowerState};
use crate::config::SchedulerConfig;
use async_trait::async_trait;
use chrono::{FixedOffset, Local, NaiveDateTime, Utc};
use errors::ServiceResult;
use plug_rules::{RuleAction, ScheduleEvaluator, ScheduleStore, SwitchActuator, TickOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[async_trait]
impl SwitchActuator for DeviceActionClient {
    async fn apply(&self, action: RuleAction) -> ServiceResult<bool> {
        let confirmed = self.set_state(PowerState::from(action)).await?;
        Ok(confirmed.is_on())
    }
}

/// Source of "now" in the schedule's wall-clock time
#[derive(Debug, Clone, Copy)]
pub enum ScheduleClock {
    Local,
    Fixed(FixedOffset),
}

impl ScheduleClock {
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        minutes
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .map(ScheduleClock::Fixed)
            .unwrap_or(ScheduleClock::Local)
    }

    pub fn now(&self) -> NaiveDateTime {
        match self {
            ScheduleClock::Local => Local::now().naive_local(),
            ScheduleClock::Fixed(offset) => Utc::now().with_timezone(offset).naive_local(),
        }
    }
}

/// Periodic driver for one device's schedule
pub struct SchedulerRunner {
    device: String,
    store: Arc<dyn ScheduleStore>,
    actuator: Arc<dyn SwitchActuator>,
    clock: ScheduleClock,
    tick: Duration,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
}

impl SchedulerRunner {
    pub fn new(
        device: impl Into<String>,
        store: Arc<dyn ScheduleStore>,
        actuator: Arc<dyn SwitchActuator>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            device: device.into(),
            store,
            actuator,
            clock: ScheduleClock::from_offset_minutes(config.utc_offset_minutes),
            tick: Duration::from_secs(config.tick_secs.max(1)),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that stops the loop when notified
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the scheduler
    pub fn stop(&self) {
        info!("Stopping scheduler...");
        self.shutdown.notify_one();
    }

    /// Run until [`stop`](Self::stop) or the shutdown handle fires
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            warn!("Scheduler already running");
            return;
        }
        info!(
            "Starting scheduler for {} with {}s tick",
            self.device,
            self.tick.as_secs()
        );

        let mut evaluator = ScheduleEvaluator::new();
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick_once(&mut evaluator, self.clock.now()).await;
                }
                _ = self.shutdown.notified() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::Relaxed);
        info!("Scheduler stopped");
    }

    /// One load-and-evaluate pass at `now`
    pub async fn tick_once(
        &self,
        evaluator: &mut ScheduleEvaluator,
        now: NaiveDateTime,
    ) -> Option<TickOutcome> {
        let schedule = match self.store.load(&self.device).await {
            Ok(schedule) => schedule,
            Err(e) => {
                error!("Failed to load schedule for {}: {}", self.device, e);
                return None;
            },
        };

        let outcome = evaluator.tick(now, &schedule, self.actuator.as_ref()).await;
        debug!("Tick {} -> {:?}", now.format("%H:%M:%S"), outcome);
        Some(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use plug_rules::{MemoryScheduleStore, Rule, Schedule, TimeEvent, WeekdaySet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<RuleAction>>);

    #[async_trait]
    impl SwitchActuator for Recorder {
        async fn apply(&self, action: RuleAction) -> ServiceResult<bool> {
            self.0.lock().unwrap().push(action);
            Ok(action == RuleAction::On)
        }
    }

    #[test]
    fn test_clock_offset() {
        assert!(matches!(
            ScheduleClock::from_offset_minutes(None),
            ScheduleClock::Local
        ));
        match ScheduleClock::from_offset_minutes(Some(-300)) {
            ScheduleClock::Fixed(offset) => assert_eq!(offset.local_minus_utc(), -300 * 60),
            other => panic!("unexpected clock {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tick_once_reloads_store() {
        let store = Arc::new(MemoryScheduleStore::new());
        let recorder = Arc::new(Recorder::default());
        let runner = SchedulerRunner::new(
            "10.0.0.5",
            store.clone(),
            recorder.clone(),
            &SchedulerConfig::default(),
        );
        let mut evaluator = ScheduleEvaluator::new();
        // 2024-01-06 is a Saturday
        let at = |h, m| {
            NaiveDate::from_ymd_opt(2024, 1, 6)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap()
        };

        assert_eq!(
            runner.tick_once(&mut evaluator, at(9, 0)).await,
            Some(TickOutcome::Idle)
        );

        let mut schedule = Schedule::new("10.0.0.5");
        schedule.rules.push(Rule::new(
            RuleAction::On,
            TimeEvent { hour: 9, minute: 1 },
            WeekdaySet::ALL,
        ));
        store.save(&schedule).await.unwrap();

        let outcome = runner.tick_once(&mut evaluator, at(9, 1)).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Applied { action: RuleAction::On, .. }));
        assert_eq!(*recorder.0.lock().unwrap(), vec![RuleAction::On]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let runner = Arc::new(SchedulerRunner::new(
            "10.0.0.5",
            Arc::new(MemoryScheduleStore::new()),
            Arc::new(Recorder::default()),
            &SchedulerConfig {
                tick_secs: 1,
                ..Default::default()
            },
        ));
        let task = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(runner.is_running());
        runner.stop();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!runner.is_running());
    }
}
