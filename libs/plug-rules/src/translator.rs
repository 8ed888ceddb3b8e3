//! Rule schema translation
//!
//! Maps between vendor rule XML and [`Schedule`]. Firmware revisions disagree
//! on field names and on how weekdays are encoded, so every field is read
//! through an ordered list of extraction strategies; the first strategy that
//! yields a value wins and a built-in default covers the rest.
//!
//! Writing always emits one canonical document:
//!
//! ```text
//! <Rules>
//!   <Rule><RuleID>..</RuleID><Enabled>1</Enabled><action>1</action>
//!         <StartTime>HH:MM</StartTime><DayMask>0-127</DayMask></Rule>
//! </Rules>
//! ```

use crate::types::{new_rule_id, Rule, RuleAction, Schedule, TimeEvent, WeekdaySet};
use crate::xml;
use chrono::Weekday;
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Root element of the canonical rule document
pub const RULES_ROOT: &str = "Rules";

/// Per-rule element of the canonical rule document
pub const RULE_ELEMENT: &str = "Rule";

/// Case-insensitive markers that a rules payload reports scheduling as enabled
const ENABLED_MARKERS: [&str; 4] = [
    "<RulesEnabled>1",
    "<RulesEnabled>true",
    "enabled=\"1\"",
    "enabled=\"true\"",
];

// ============================================================================
// Field extraction strategies
// ============================================================================

/// One way of reading a field from a rule entry; `None` means "not present here"
type Strategy<T> = fn(&str) -> Option<T>;

const ENABLED_STRATEGIES: &[Strategy<bool>] = &[enabled_from_tag];
const ACTION_STRATEGIES: &[Strategy<RuleAction>] = &[action_from_action_tag, action_from_state_tag];
const TIME_STRATEGIES: &[Strategy<TimeEvent>] = &[time_from_start_time, time_from_split_fields];
const WEEKDAY_STRATEGIES: &[Strategy<WeekdaySet>] = &[
    weekdays_from_csv,
    weekdays_from_day_elements,
    weekdays_from_mask,
];
const ID_STRATEGIES: &[Strategy<String>] = &[id_from_tag];

fn first_match<T>(entry: &str, strategies: &[Strategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(entry))
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

fn enabled_from_tag(entry: &str) -> Option<bool> {
    parse_bool(xml::extract_first(entry, &["Enabled", "enabled"]))
}

fn action_from_action_tag(entry: &str) -> Option<RuleAction> {
    non_empty(xml::extract_first(entry, &["action", "Action"])).map(normalize_action)
}

fn action_from_state_tag(entry: &str) -> Option<RuleAction> {
    non_empty(xml::extract_first(entry, &["State", "state"])).map(normalize_action)
}

fn time_from_start_time(entry: &str) -> Option<TimeEvent> {
    let raw = non_empty(xml::extract_tag(entry, "StartTime"))?;
    // Seconds, when present, are ignored
    let mut parts = raw.split(':');
    let hour = parts.next().unwrap_or("");
    let minute = parts.next().unwrap_or("");
    Some(TimeEvent {
        hour: lenient_component(hour, 23),
        minute: lenient_component(minute, 59),
    })
}

fn time_from_split_fields(entry: &str) -> Option<TimeEvent> {
    let hour = xml::extract_first(entry, &["StartHour", "Hour"]);
    let minute = xml::extract_first(entry, &["StartMinute", "Minute"]);
    if hour.is_empty() && minute.is_empty() {
        return None;
    }
    Some(TimeEvent {
        hour: lenient_component(hour, 23),
        minute: lenient_component(minute, 59),
    })
}

fn weekdays_from_csv(entry: &str) -> Option<WeekdaySet> {
    let raw = xml::extract_first(entry, &["Weekdays", "weekdays"]);
    let set: WeekdaySet = raw
        .split([',', ';', ' '])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(normalize_day_token)
        .collect();
    Some(set).filter(|s| !s.is_empty())
}

fn weekdays_from_day_elements(entry: &str) -> Option<WeekdaySet> {
    let set: WeekdaySet = xml::elements(entry, "Day")
        .into_iter()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(normalize_day_token)
        .collect();
    Some(set).filter(|s| !s.is_empty())
}

fn weekdays_from_mask(entry: &str) -> Option<WeekdaySet> {
    let raw = non_empty(xml::extract_first(entry, &["Repeat", "DayMask"]))?;
    let mask: u32 = raw.parse().ok()?;
    Some(WeekdaySet::from_mask((mask & 0x7F) as u8)).filter(|s| !s.is_empty())
}

fn id_from_tag(entry: &str) -> Option<String> {
    non_empty(xml::extract_first(entry, &["RuleID", "id"]))
        .map(|id| xml::decode_entities(id).into_owned())
}

// ============================================================================
// Token normalizers
// ============================================================================

/// `1/0/true/false`, case-insensitive; anything else is `None`
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// `1`/`on` → on, `0`/`off` → off; any other token is treated as on
pub fn normalize_action(token: &str) -> RuleAction {
    let token = token.trim();
    if token == "0" || token.eq_ignore_ascii_case("off") {
        RuleAction::Off
    } else {
        RuleAction::On
    }
}

/// Day token → weekday
///
/// Accepts three-letter and full English names and the numbers 0-7 (1 = Monday,
/// both 0 and 7 = Sunday), case-insensitive. An unrecognized token maps to
/// Monday rather than being rejected; callers relying on strict input should
/// use [`crate::parse_weekday_abbrev`].
pub fn normalize_day_token(token: &str) -> Weekday {
    let token = token.trim().to_ascii_lowercase();
    if let Ok(n) = token.parse::<u32>() {
        return match n {
            2 => Weekday::Tue,
            3 => Weekday::Wed,
            4 => Weekday::Thu,
            5 => Weekday::Fri,
            6 => Weekday::Sat,
            0 | 7 => Weekday::Sun,
            _ => Weekday::Mon,
        };
    }
    match token.as_str() {
        "tue" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        "sun" | "sunday" => Weekday::Sun,
        // "mon", "monday" and every unrecognized token
        _ => Weekday::Mon,
    }
}

/// Parse an hour/minute component; unparsable → 0, out of range → clamped
fn lenient_component(raw: &str, max: u8) -> u8 {
    raw.trim()
        .parse::<i64>()
        .map(|v| v.clamp(0, i64::from(max)) as u8)
        .unwrap_or(0)
}

// ============================================================================
// Read: XML → Schedule
// ============================================================================

/// Rule markup of a GetRules response, unwrapped and entity-decoded
///
/// Devices return the rule document either inline or entity-escaped inside a
/// `<Rules>` text node; both come out as plain markup.
pub fn rules_payload(raw: &str) -> Cow<'_, str> {
    let wrapped = xml::extract_tag(raw, RULES_ROOT);
    let body = if wrapped.is_empty() { raw } else { wrapped };
    if !xml::contains_ignore_case(body, "<rule") && xml::contains_ignore_case(body, "&lt;rule") {
        xml::decode_entities(body)
    } else {
        Cow::Borrowed(body)
    }
}

/// Read one rule entry, applying every field's fallback chain
pub fn parse_rule_entry(entry: &str) -> Rule {
    Rule {
        id: first_match(entry, ID_STRATEGIES).unwrap_or_else(new_rule_id),
        enabled: first_match(entry, ENABLED_STRATEGIES).unwrap_or(true),
        action: first_match(entry, ACTION_STRATEGIES).unwrap_or(RuleAction::On),
        time: first_match(entry, TIME_STRATEGIES).unwrap_or_default(),
        weekdays: first_match(entry, WEEKDAY_STRATEGIES).unwrap_or(WeekdaySet::ALL),
    }
}

/// Read every rule entry of a rules payload
///
/// Entries failing validation, and later entries reusing an earlier id, are
/// dropped; the remaining rules keep document order.
pub fn parse_rules(raw: &str) -> Vec<Rule> {
    let payload = rules_payload(raw);
    let entries = xml::elements(&payload, RULE_ELEMENT);
    let mut seen = HashSet::with_capacity(entries.len());
    let mut rules = Vec::with_capacity(entries.len());

    for entry in entries {
        let rule = parse_rule_entry(entry);
        if let Err(e) = rule.validate() {
            debug!("Dropping invalid rule entry: {}", e);
            continue;
        }
        if !seen.insert(rule.id.clone()) {
            warn!("Dropping rule with duplicate id '{}'", rule.id);
            continue;
        }
        rules.push(rule);
    }

    rules
}

/// Heuristic global-enabled flag for devices without a capability query
pub fn infer_enabled(raw: &str) -> bool {
    let decoded = xml::decode_entities(raw);
    ENABLED_MARKERS
        .iter()
        .any(|marker| xml::contains_ignore_case(&decoded, marker))
}

/// Build a schedule for `device` from a rules payload
///
/// `enabled` is the device's own answer when it has one; otherwise the flag
/// is inferred from the payload text.
pub fn parse_schedule(raw: &str, device: &str, enabled: Option<bool>) -> Schedule {
    let rules = parse_rules(raw);
    debug!("Parsed {} rule(s) for {}", rules.len(), device);
    Schedule {
        device: device.to_string(),
        enabled: enabled.unwrap_or_else(|| infer_enabled(raw)),
        rules,
    }
}

// ============================================================================
// Write: Schedule → XML
// ============================================================================

/// Serialize to the canonical rule document
pub fn write_schedule(schedule: &Schedule) -> String {
    let mut doc = String::with_capacity(32 + schedule.rules.len() * 128);
    doc.push_str("<Rules>");
    for rule in &schedule.rules {
        doc.push_str(&format!(
            "<Rule><RuleID>{}</RuleID><Enabled>{}</Enabled><action>{}</action>\
             <StartTime>{}</StartTime><DayMask>{}</DayMask></Rule>",
            xml::escape(&rule.id),
            if rule.enabled { 1 } else { 0 },
            rule.action.as_binary(),
            rule.time,
            rule.weekdays.mask(),
        ));
    }
    doc.push_str("</Rules>");
    doc
}
