//! Rules-port discovery
//!
//! Firmware moves the rules service between ports in the UPnP ephemeral
//! range. When a rules call cannot connect, the resolver probes each
//! candidate with `GetRulesDBVersion` and adopts the first one that answers
//! with a non-empty version.

use crate::endpoint::{Endpoint, Service};
use crate::soap::SoapTransport;
use plug_rules::xml;
use tracing::{debug, info, warn};

/// Typical ports of the rules service, probed in this order
pub const DEFAULT_RULES_PORTS: [u16; 9] = [
    49152, 49153, 49154, 49155, 49156, 49157, 49158, 49159, 49160,
];

pub const RULES_DB_VERSION_ACTION: &str = "GetRulesDBVersion";
pub const RULES_DB_VERSION_TAG: &str = "RulesDBVersion";

/// Finds the port the rules service currently listens on
#[derive(Debug, Clone)]
pub struct RulesPortResolver {
    candidates: Vec<u16>,
}

impl Default for RulesPortResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RULES_PORTS.to_vec())
    }
}

impl RulesPortResolver {
    pub fn new(candidates: Vec<u16>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[u16] {
        &self.candidates
    }

    /// Probe candidates in order and adopt the first that answers
    ///
    /// `candidates` overrides the configured list for this call. The rules
    /// port stays locked for the whole probe; on failure it is restored to
    /// its original value and `None` is returned.
    pub async fn resolve(
        &self,
        transport: &SoapTransport,
        endpoint: &Endpoint,
        candidates: Option<&[u16]>,
    ) -> Option<u16> {
        let candidates = candidates.unwrap_or(&self.candidates);
        let mut port = endpoint.lock_rules_port().await;
        let original = *port;

        for &candidate in candidates {
            *port = candidate;
            let url = endpoint.url(candidate, Service::Rules);
            match transport
                .invoke(Service::Rules, RULES_DB_VERSION_ACTION, "", &url)
                .await
            {
                Ok(body) if !xml::extract_tag(&body, RULES_DB_VERSION_TAG).is_empty() => {
                    if candidate != original {
                        info!(
                            "Rules service for {} moved: port {} -> {}",
                            endpoint.host(),
                            original,
                            candidate
                        );
                    }
                    return Some(candidate);
                },
                Ok(_) => debug!("Port {} answered without a rules DB version", candidate),
                Err(e) => debug!("Port {} rejected: {}", candidate, e),
            }
        }

        *port = original;
        warn!(
            "No rules service found for {} on ports {:?}; keeping {}",
            endpoint.host(),
            candidates,
            original
        );
        None
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing_test::traced_test;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_default_candidates() {
        let resolver = RulesPortResolver::default();
        assert_eq!(resolver.candidates().first(), Some(&49152));
        assert_eq!(resolver.candidates().len(), 9);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_resolve_logs_port_move() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header(
                "SOAPACTION",
                "\"urn:Belkin:service:rules:1#GetRulesDBVersion\"",
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<RulesDBVersion>7</RulesDBVersion>"),
            )
            .mount(&server)
            .await;

        let live = server.address().port();
        let stale = closed_port();
        let endpoint = Endpoint::new("127.0.0.1", live).with_rules_port(stale);
        let transport = SoapTransport::new(Duration::from_secs(2)).unwrap();
        let resolver = RulesPortResolver::new(vec![stale, live]);

        assert_eq!(resolver.resolve(&transport, &endpoint, None).await, Some(live));
        assert_eq!(endpoint.rules_port().await, live);
        assert!(logs_contain("moved"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_resolve_failure_keeps_port() {
        let stale = closed_port();
        let endpoint = Endpoint::new("127.0.0.1", stale);
        let transport = SoapTransport::new(Duration::from_secs(2)).unwrap();
        let resolver = RulesPortResolver::default();

        let others = [closed_port(), closed_port()];
        assert_eq!(resolver.resolve(&transport, &endpoint, Some(&others)).await, None);
        assert_eq!(endpoint.rules_port().await, stale);
        assert!(logs_contain("No rules service found"));
    }
}
