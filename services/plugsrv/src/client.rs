//! Device action client
//!
//! One method per device action. Getters fail with
//! [`PlugSrvError::ResponseFieldMissing`] when the call succeeds but the
//! expected element is absent. Rules-service calls that cannot connect
//! trigger one port re-resolution and a single retry.

use crate::endpoint::{Endpoint, Service};
use crate::error::{PlugSrvError, Result};
use crate::resolver::{RulesPortResolver, RULES_DB_VERSION_ACTION, RULES_DB_VERSION_TAG};
use crate::soap::SoapTransport;
use plug_rules::translator::{parse_bool, parse_schedule, write_schedule};
use plug_rules::{xml, RuleAction, Schedule};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// Power state
// ============================================================================

/// Relay state of the plug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Decode a `BinaryState` value
    ///
    /// Firmware may append `|`-separated fields; only the first counts.
    /// `0` is off and anything else is on.
    pub fn from_binary(value: &str) -> Self {
        let head = value.split('|').next().unwrap_or("").trim();
        if head == "0" {
            PowerState::Off
        } else {
            PowerState::On
        }
    }

    pub fn as_binary(self) -> &'static str {
        match self {
            PowerState::On => "1",
            PowerState::Off => "0",
        }
    }

    pub fn is_on(self) -> bool {
        self == PowerState::On
    }

    pub fn toggled(self) -> Self {
        match self {
            PowerState::On => PowerState::Off,
            PowerState::Off => PowerState::On,
        }
    }
}

impl From<RuleAction> for PowerState {
    fn from(action: RuleAction) -> Self {
        match action {
            RuleAction::On => PowerState::On,
            RuleAction::Off => PowerState::Off,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        })
    }
}

/// Identity summary gathered from several basic-control calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub host: String,
    pub port: u16,
    pub rules_port: u16,
    pub friendly_name: String,
    pub signal_strength: String,
    pub home_id: String,
}

// ============================================================================
// Client
// ============================================================================

/// SOAP client for one plug
#[derive(Debug)]
pub struct DeviceActionClient {
    endpoint: Endpoint,
    transport: SoapTransport,
    resolver: RulesPortResolver,
}

impl DeviceActionClient {
    /// Client with the default rules-port candidates
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint,
            transport: SoapTransport::new(timeout)?,
            resolver: RulesPortResolver::default(),
        })
    }

    pub fn with_resolver(mut self, resolver: RulesPortResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn host(&self) -> &str {
        self.endpoint.host()
    }

    // ------------------------------------------------------------------
    // Call plumbing
    // ------------------------------------------------------------------

    async fn call_basic(&self, action: &str, fragment: &str) -> Result<String> {
        self.transport
            .invoke(Service::BasicEvent, action, fragment, &self.endpoint.basic_url())
            .await
    }

    async fn call_rules(&self, action: &str, fragment: &str) -> Result<String> {
        let url = self.endpoint.rules_url().await;
        let original = match self
            .transport
            .invoke(Service::Rules, action, fragment, &url)
            .await
        {
            Err(e) if e.is_connect() => e,
            other => return other,
        };

        debug!("{} could not connect ({}), resolving rules port", action, original);
        match self
            .resolver
            .resolve(&self.transport, &self.endpoint, None)
            .await
        {
            Some(port) => {
                let url = self.endpoint.url(port, Service::Rules);
                self.transport
                    .invoke(Service::Rules, action, fragment, &url)
                    .await
            },
            None => Err(original),
        }
    }

    async fn required_field(
        &self,
        service: Service,
        action: &str,
        fragment: &str,
        tag: &str,
    ) -> Result<String> {
        let body = match service {
            Service::BasicEvent => self.call_basic(action, fragment).await?,
            Service::Rules => self.call_rules(action, fragment).await?,
        };
        let value = xml::extract_tag(&body, tag);
        if value.is_empty() {
            return Err(PlugSrvError::missing(action, tag));
        }
        Ok(xml::decode_entities(value).into_owned())
    }

    // ------------------------------------------------------------------
    // Basic control
    // ------------------------------------------------------------------

    pub async fn get_state(&self) -> Result<PowerState> {
        let value = self
            .required_field(Service::BasicEvent, "GetBinaryState", "", "BinaryState")
            .await?;
        Ok(PowerState::from_binary(&value))
    }

    /// Switch the relay; returns the state the device confirms
    pub async fn set_state(&self, state: PowerState) -> Result<PowerState> {
        let fragment = format!("<BinaryState>{}</BinaryState>", state.as_binary());
        let value = self
            .required_field(Service::BasicEvent, "SetBinaryState", &fragment, "BinaryState")
            .await?;
        // Some firmware answers "Error" when the relay is already in the requested state
        if value.eq_ignore_ascii_case("error") {
            debug!("SetBinaryState returned Error, re-reading state");
            return self.get_state().await;
        }
        let confirmed = PowerState::from_binary(&value);
        info!("{} switched {}", self.host(), confirmed);
        Ok(confirmed)
    }

    /// Read the current state and set the opposite
    pub async fn toggle(&self) -> Result<PowerState> {
        let current = self.get_state().await?;
        self.set_state(current.toggled()).await
    }

    pub async fn get_signal_strength(&self) -> Result<String> {
        self.required_field(Service::BasicEvent, "GetSignalStrength", "", "SignalStrength")
            .await
    }

    pub async fn get_log_file_url(&self) -> Result<String> {
        self.required_field(Service::BasicEvent, "GetLogFileURL", "", "LOGURL")
            .await
    }

    pub async fn get_icon_url(&self) -> Result<String> {
        self.required_field(Service::BasicEvent, "GetIconURL", "", "URL")
            .await
    }

    pub async fn get_home_id(&self) -> Result<String> {
        self.required_field(Service::BasicEvent, "GetHomeId", "", "HomeId")
            .await
    }

    pub async fn get_friendly_name(&self) -> Result<String> {
        self.required_field(Service::BasicEvent, "GetFriendlyName", "", "FriendlyName")
            .await
    }

    pub async fn change_friendly_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlugSrvError::Validation(
                "Friendly name must not be empty".to_string(),
            ));
        }
        let fragment = format!("<FriendlyName>{}</FriendlyName>", xml::escape(name));
        self.call_basic("ChangeFriendlyName", &fragment).await?;
        info!("{} renamed to '{}'", self.host(), name);
        Ok(())
    }

    /// Friendly name, signal strength and home id in one summary
    pub async fn device_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo {
            host: self.host().to_string(),
            port: self.endpoint.port(),
            rules_port: self.endpoint.rules_port().await,
            friendly_name: self.get_friendly_name().await?,
            signal_strength: self.get_signal_strength().await?,
            home_id: self.get_home_id().await?,
        })
    }

    // ------------------------------------------------------------------
    // Rules service
    // ------------------------------------------------------------------

    /// Raw GetRules response body
    pub async fn get_device_schedule_xml(&self) -> Result<String> {
        self.call_rules("GetRules", "").await
    }

    /// Device rules as a schedule
    ///
    /// The global flag comes from `GetRulesEnabled` when the device supports
    /// it, otherwise from the payload text.
    pub async fn get_device_schedule(&self) -> Result<Schedule> {
        let raw = self.get_device_schedule_xml().await?;
        let enabled = match self.get_schedule_enabled().await {
            Ok(enabled) => Some(enabled),
            Err(e) => {
                debug!("GetRulesEnabled unavailable ({}), inferring from rules", e);
                None
            },
        };
        Ok(parse_schedule(&raw, self.host(), enabled))
    }

    /// Write `schedule` to the device; returns it bound to this device
    ///
    /// Setting the global flag afterwards is best effort: per-rule `Enabled`
    /// values stay authoritative when the device lacks the capability.
    pub async fn set_device_schedule(&self, schedule: &Schedule) -> Result<Schedule> {
        let mut schedule = schedule.clone();
        schedule.bind_device(self.host())?;
        schedule.validate()?;

        let document = write_schedule(&schedule);
        let fragment = format!("<Rules>{}</Rules>", xml::escape(&document));
        self.call_rules("SetRules", &fragment).await?;
        info!(
            "Wrote {} rule(s) to {}",
            schedule.rules.len(),
            self.host()
        );

        if let Err(e) = self.set_schedule_enabled(schedule.enabled).await {
            warn!("Could not set global schedule flag on {}: {}", self.host(), e);
        }
        Ok(schedule)
    }

    pub async fn get_rules_db_version(&self) -> Result<String> {
        self.required_field(Service::Rules, RULES_DB_VERSION_ACTION, "", RULES_DB_VERSION_TAG)
            .await
    }

    pub async fn get_schedule_enabled(&self) -> Result<bool> {
        let value = self
            .required_field(Service::Rules, "GetRulesEnabled", "", "RulesEnabled")
            .await?;
        parse_bool(&value).ok_or_else(|| PlugSrvError::missing("GetRulesEnabled", "RulesEnabled"))
    }

    pub async fn set_schedule_enabled(&self, enabled: bool) -> Result<()> {
        let fragment = format!("<RulesEnabled>{}</RulesEnabled>", if enabled { 1 } else { 0 });
        self.call_rules("SetRulesEnabled", &fragment).await?;
        Ok(())
    }

    /// Run port discovery directly; `None` leaves the rules port unchanged
    pub async fn probe_rules_port(&self, candidates: Option<&[u16]>) -> Option<u16> {
        self.resolver
            .resolve(&self.transport, &self.endpoint, candidates)
            .await
    }
}
