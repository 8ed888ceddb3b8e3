//! Schedule type definitions
//!
//! Core value objects shared by the translator, the evaluator and the stores:
//! - WeekdaySet: 7-bit day mask (bit 0 = Monday ... bit 6 = Sunday)
//! - TimeEvent: hour/minute of day
//! - Rule: one timed on/off action
//! - Schedule: ordered rule list owned by one device

use crate::error::{Result, RuleError};
use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Weekdays
// ============================================================================

/// Three-letter day names in mask bit order
pub const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Three-letter name of a weekday (`Mon`, `Tue`, ...)
pub fn weekday_abbrev(day: Weekday) -> &'static str {
    WEEKDAY_NAMES[day.num_days_from_monday() as usize]
}

/// Strict three-letter lookup, case-insensitive
pub fn parse_weekday_abbrev(name: &str) -> Option<Weekday> {
    let name = name.trim();
    WEEKDAY_NAMES
        .iter()
        .position(|n| n.eq_ignore_ascii_case(name))
        .map(|idx| DAYS[idx])
}

/// Set of active weekdays
///
/// Stored as the day mask itself, so the name-list and mask encodings are
/// two views of one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0x7F);

    /// Decode a day mask; bits above bit 6 are ignored
    pub fn from_mask(mask: u8) -> Self {
        Self(mask & 0x7F)
    }

    /// Encode as a day mask in `0..=127`
    pub fn mask(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        DAYS.into_iter().filter(move |d| self.contains(*d))
    }

    /// Ordered three-letter names, Monday first
    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(weekday_abbrev).collect()
    }

    /// Build from three-letter names (case-insensitive); any other token is rejected
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::EMPTY;
        for name in names {
            let name = name.as_ref();
            let day = parse_weekday_abbrev(name).ok_or_else(|| {
                RuleError::Parse(format!(
                    "weekday '{}' is not one of Mon,Tue,Wed,Thu,Fri,Sat,Sun",
                    name
                ))
            })?;
            set.insert(day);
        }
        Ok(set)
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<T: IntoIterator<Item = Weekday>>(iter: T) -> Self {
        let mut set = Self::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(","))
    }
}

impl Serialize for WeekdaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

impl<'de> Deserialize<'de> for WeekdaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        WeekdaySet::from_names(&names).map_err(D::Error::custom)
    }
}

// ============================================================================
// TimeEvent
// ============================================================================

/// Time of day with minute granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimeEvent {
    pub hour: u8,
    pub minute: u8,
}

impl TimeEvent {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        let time = Self { hour, minute };
        time.validate()?;
        Ok(time)
    }

    /// Strict `HH:MM` (24h) parser for user input
    pub fn parse_hhmm(input: &str) -> Result<Self> {
        let (h, m) = input
            .trim()
            .split_once(':')
            .ok_or_else(|| RuleError::validation("Time must be HH:MM"))?;
        let hour: u8 = h
            .trim()
            .parse()
            .map_err(|_| RuleError::validation("Time must be HH:MM"))?;
        let minute: u8 = m
            .trim()
            .parse()
            .map_err(|_| RuleError::validation("Time must be HH:MM"))?;
        if hour > 23 {
            return Err(RuleError::validation("Hour must be 0-23"));
        }
        if minute > 59 {
            return Err(RuleError::validation("Minute must be 0-59"));
        }
        Ok(Self { hour, minute })
    }

    pub fn validate(&self) -> Result<()> {
        if self.hour > 23 {
            return Err(RuleError::validation(
                "Rule.Time.Hour must be between 0 and 23",
            ));
        }
        if self.minute > 59 {
            return Err(RuleError::validation(
                "Rule.Time.Minute must be between 0 and 59",
            ));
        }
        Ok(())
    }

    pub fn matches(&self, now: &NaiveDateTime) -> bool {
        u32::from(self.hour) == now.hour() && u32::from(self.minute) == now.minute()
    }
}

impl fmt::Display for TimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// ============================================================================
// RuleAction
// ============================================================================

/// Switch action applied when a rule fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    On,
    Off,
}

impl RuleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleAction::On => "on",
            RuleAction::Off => "off",
        }
    }

    /// Wire encoding used by the device (`1`/`0`)
    pub fn as_binary(self) -> &'static str {
        match self {
            RuleAction::On => "1",
            RuleAction::Off => "0",
        }
    }
}

impl FromStr for RuleAction {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "on" => Ok(RuleAction::On),
            "off" => Ok(RuleAction::Off),
            other => Err(RuleError::validation(format!(
                "Rule.Action must be 'on' or 'off', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Rule
// ============================================================================

/// Generate a fresh rule id (32 hex chars)
pub fn new_rule_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn default_enabled() -> bool {
    true
}

/// One timed switch action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "new_rule_id")]
    pub id: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub action: RuleAction,

    pub time: TimeEvent,

    pub weekdays: WeekdaySet,
}

impl Rule {
    /// Enabled rule with a freshly generated id
    pub fn new(action: RuleAction, time: TimeEvent, weekdays: WeekdaySet) -> Self {
        Self {
            id: new_rule_id(),
            enabled: true,
            action,
            time,
            weekdays,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RuleError::validation("Rule.Id is required"));
        }
        // Ids must round-trip through trimmed text nodes
        if self.id.trim() != self.id {
            return Err(RuleError::validation(format!(
                "Rule.Id '{}' has leading or trailing whitespace",
                self.id
            )));
        }
        self.time.validate()?;
        if self.weekdays.is_empty() {
            return Err(RuleError::validation(
                "Rule.Weekdays must include at least one weekday",
            ));
        }
        Ok(())
    }

    /// Exact hour-and-minute match on an active weekday
    pub fn is_due_now(&self, now: &NaiveDateTime) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.weekdays.contains(now.weekday()) {
            return false;
        }
        self.time.matches(now)
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Ordered rule list for one device
///
/// Rule order matters: when several rules fire in the same minute the last
/// one wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Owning device address
    #[serde(default)]
    pub device: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Schedule {
    /// Empty, enabled schedule
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            enabled: true,
            rules: Vec::new(),
        }
    }

    /// One `on` rule at `start` and an optional `off` rule at `stop`, every day
    pub fn from_window(
        device: impl Into<String>,
        enabled: bool,
        start: TimeEvent,
        stop: Option<TimeEvent>,
    ) -> Self {
        let mut rules = vec![Rule::new(RuleAction::On, start, WeekdaySet::ALL)];
        if let Some(stop) = stop {
            rules.push(Rule::new(RuleAction::Off, stop, WeekdaySet::ALL));
        }
        Self {
            device: device.into(),
            enabled,
            rules,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(RuleError::validation("Schedule.DeviceIp is required"));
        }
        let mut seen = HashSet::with_capacity(self.rules.len());
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleError::validation(format!(
                    "Schedule.Rules must have unique Ids (duplicate '{}')",
                    rule.id
                )));
            }
            rule.validate()?;
        }
        Ok(())
    }

    /// Bind the schedule to `host`: fill an empty device address, reject a foreign one
    pub fn bind_device(&mut self, host: &str) -> Result<()> {
        if self.device.trim().is_empty() {
            self.device = host.to_string();
            return Ok(());
        }
        if !self.device.eq_ignore_ascii_case(host) {
            return Err(RuleError::validation(format!(
                "Schedule.DeviceIp '{}' must match the client address '{}'",
                self.device, host
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_mask_bit_order() {
        let set: WeekdaySet = [Weekday::Mon, Weekday::Sun].into_iter().collect();
        assert_eq!(set.mask(), 0b100_0001);
        assert_eq!(set.names(), vec!["Mon", "Sun"]);
        assert_eq!(WeekdaySet::from_mask(0xFF), WeekdaySet::ALL);
        assert_eq!(WeekdaySet::ALL.len(), 7);
    }

    #[test]
    fn test_from_names_is_strict() {
        let set = WeekdaySet::from_names(["mon", "WED", "Fri"]).unwrap();
        assert_eq!(set.mask(), 0b001_0101);
        assert!(WeekdaySet::from_names(["Monday"]).is_err());
    }

    #[test]
    fn test_weekday_set_serde_uses_names() {
        let set = WeekdaySet::from_mask(0b110_0000);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["Sat","Sun"]"#);
        let back: WeekdaySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert!(serde_json::from_str::<WeekdaySet>(r#"["Funday"]"#).is_err());
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(
            TimeEvent::parse_hhmm("07:05").unwrap(),
            TimeEvent { hour: 7, minute: 5 }
        );
        assert!(TimeEvent::parse_hhmm("24:00").is_err());
        assert!(TimeEvent::parse_hhmm("12:60").is_err());
        assert!(TimeEvent::parse_hhmm("1200").is_err());
        assert!(TimeEvent::parse_hhmm("ab:cd").is_err());
        assert_eq!(TimeEvent { hour: 7, minute: 5 }.to_string(), "07:05");
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("on".parse::<RuleAction>().unwrap(), RuleAction::On);
        assert_eq!("off".parse::<RuleAction>().unwrap(), RuleAction::Off);
        assert!(matches!(
            "toggle".parse::<RuleAction>(),
            Err(RuleError::Validation(_))
        ));
    }

    #[test]
    fn test_rule_validate() {
        let rule = Rule::new(
            RuleAction::On,
            TimeEvent { hour: 8, minute: 0 },
            WeekdaySet::ALL,
        );
        assert!(rule.validate().is_ok());

        let mut bad = rule.clone();
        bad.time.hour = 24;
        assert!(bad.validate().is_err());

        let mut bad = rule.clone();
        bad.time.minute = 60;
        assert!(bad.validate().is_err());

        let mut bad = rule.clone();
        bad.weekdays = WeekdaySet::EMPTY;
        assert!(bad.validate().is_err());

        assert!(rule.clone().with_id("night light").validate().is_ok());
        for padded in [" morning ", "a ", "\tb", "   "] {
            let bad = rule.clone().with_id(padded);
            assert!(
                matches!(bad.validate(), Err(RuleError::Validation(_))),
                "id {:?} should be rejected",
                padded
            );
        }
    }

    #[test]
    fn test_is_due_now() {
        // 2024-01-01 is a Monday
        let rule = Rule::new(
            RuleAction::On,
            TimeEvent { hour: 8, minute: 0 },
            WeekdaySet::from_names(["Mon"]).unwrap(),
        );
        assert!(rule.is_due_now(&at(2024, 1, 1, 8, 0, 0)));
        assert!(rule.is_due_now(&at(2024, 1, 1, 8, 0, 59)));
        assert!(!rule.is_due_now(&at(2024, 1, 1, 8, 1, 0)));
        assert!(!rule.is_due_now(&at(2024, 1, 2, 8, 0, 0)));

        let mut disabled = rule;
        disabled.enabled = false;
        assert!(!disabled.is_due_now(&at(2024, 1, 1, 8, 0, 0)));
    }

    #[test]
    fn test_schedule_validate_unique_ids() {
        let mut schedule = Schedule::from_window(
            "10.0.0.5",
            true,
            TimeEvent { hour: 7, minute: 0 },
            Some(TimeEvent { hour: 22, minute: 0 }),
        );
        assert!(schedule.validate().is_ok());
        assert_eq!(schedule.rules.len(), 2);
        assert_eq!(schedule.rules[1].action, RuleAction::Off);

        let first_id = schedule.rules[0].id.clone();
        schedule.rules[1].id = first_id;
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn test_bind_device() {
        let mut schedule = Schedule::new("");
        schedule.bind_device("10.0.0.5").unwrap();
        assert_eq!(schedule.device, "10.0.0.5");

        let mut schedule = Schedule::new("Plug.Local");
        assert!(schedule.bind_device("plug.local").is_ok());
        assert!(schedule.bind_device("10.0.0.6").is_err());
    }

    #[test]
    fn test_schedule_json_shape() {
        let json = r#"{
            "device": "10.0.0.5",
            "enabled": false,
            "rules": [
                {"id": "r1", "action": "off", "time": {"hour": 22, "minute": 30}, "weekdays": ["Sat", "Sun"]}
            ]
        }"#;
        let schedule: Schedule = serde_json::from_str(json).unwrap();
        assert!(!schedule.enabled);
        assert!(schedule.rules[0].enabled);
        assert_eq!(schedule.rules[0].weekdays.mask(), 0b110_0000);
    }
}
