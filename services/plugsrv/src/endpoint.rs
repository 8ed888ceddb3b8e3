//! Device endpoint
//!
//! Basic-control calls always go to the configured port. The rules service
//! often listens elsewhere, so its port lives behind an async mutex: readers
//! copy it out, and [`crate::RulesPortResolver`] holds the lock for the whole
//! probe so no caller observes a half-resolved port.

use tokio::sync::{Mutex, MutexGuard};

/// Devices' usual basic-control port
pub const DEFAULT_PORT: u16 = 49153;

/// SOAP services exposed by the plug
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// On/off, state and identity actions
    BasicEvent,
    /// Device-resident rules database
    Rules,
}

impl Service {
    pub fn urn(self) -> &'static str {
        match self {
            Service::BasicEvent => "urn:Belkin:service:basicevent:1",
            Service::Rules => "urn:Belkin:service:rules:1",
        }
    }

    pub fn control_path(self) -> &'static str {
        match self {
            Service::BasicEvent => "/upnp/control/basicevent1",
            Service::Rules => "/upnp/control/rules1",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Service::BasicEvent => "basicevent",
            Service::Rules => "rules",
        }
    }
}

/// Host plus basic and rules ports
#[derive(Debug)]
pub struct Endpoint {
    host: String,
    port: u16,
    rules_port: Mutex<u16>,
}

impl Endpoint {
    /// Rules port starts equal to the basic port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            rules_port: Mutex::new(port),
        }
    }

    pub fn with_rules_port(self, rules_port: u16) -> Self {
        Self {
            rules_port: Mutex::new(rules_port),
            ..self
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current rules port (waits if a resolve is in progress)
    pub async fn rules_port(&self) -> u16 {
        *self.rules_port.lock().await
    }

    pub fn url(&self, port: u16, service: Service) -> String {
        format!("http://{}:{}{}", self.host, port, service.control_path())
    }

    pub fn basic_url(&self) -> String {
        self.url(self.port, Service::BasicEvent)
    }

    pub async fn rules_url(&self) -> String {
        let port = self.rules_port().await;
        self.url(port, Service::Rules)
    }

    /// Exclusive access to the rules port for the duration of a resolve
    pub(crate) async fn lock_rules_port(&self) -> MutexGuard<'_, u16> {
        self.rules_port.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_urls() {
        let endpoint = Endpoint::new("10.0.0.5", DEFAULT_PORT).with_rules_port(49154);
        assert_eq!(
            endpoint.basic_url(),
            "http://10.0.0.5:49153/upnp/control/basicevent1"
        );
        assert_eq!(
            endpoint.rules_url().await,
            "http://10.0.0.5:49154/upnp/control/rules1"
        );
    }

    #[tokio::test]
    async fn test_rules_port_defaults_to_basic_port() {
        let endpoint = Endpoint::new("plug.local", 49155);
        assert_eq!(endpoint.rules_port().await, 49155);
        *endpoint.lock_rules_port().await = 49158;
        assert_eq!(endpoint.rules_port().await, 49158);
        assert_eq!(endpoint.port(), 49155);
    }
}
