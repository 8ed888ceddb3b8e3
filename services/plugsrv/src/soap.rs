//! SOAP 1.1 transport
//!
//! ```text
//! POST http://<host>:<port>/upnp/control/<service>
//! SOAPACTION: "urn:Belkin:service:<service>:1#<Action>"
//! Content-Type: text/xml; charset="utf-8"
//!
//! <s:Envelope ...><s:Body><u:Action xmlns:u="urn">fragment</u:Action></s:Body></s:Envelope>
//! ```
//!
//! Response bodies are decoded as UTF-8 whatever charset the device claims.

use crate::endpoint::Service;
use crate::error::{PlugSrvError, Result, TransportError};
use common::WIRE_TARGET;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::debug;

pub const SOAP_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";
pub const SOAP_ACTION_HEADER: &str = "SOAPACTION";

/// Quoted `"urn#Action"` header value
pub fn soap_action(service: Service, action: &str) -> String {
    format!("\"{}#{}\"", service.urn(), action)
}

/// Minimal envelope around one action element
pub fn build_envelope(service: Service, action: &str, fragment: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
            "<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" ",
            "s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">",
            "<s:Body><u:{action} xmlns:u=\"{urn}\">{fragment}</u:{action}></s:Body>",
            "</s:Envelope>"
        ),
        action = action,
        urn = service.urn(),
        fragment = fragment,
    )
}

/// HTTP client for SOAP calls, one per device client
#[derive(Debug, Clone)]
pub struct SoapTransport {
    http: HttpClient,
    timeout: Duration,
}

impl SoapTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlugSrvError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one action and return the raw response body
    ///
    /// A non-success status fails. Basic-control failures drop the body; rules
    /// failures carry it in [`TransportError::Status`].
    pub async fn invoke(
        &self,
        service: Service,
        action: &str,
        fragment: &str,
        url: &str,
    ) -> Result<String> {
        let envelope = build_envelope(service, action, fragment);
        debug!(target: WIRE_TARGET, "-> {} {}: {}", url, action, envelope);

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header(SOAP_ACTION_HEADER, soap_action(service, action))
            .body(envelope)
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = match service {
                Service::BasicEvent => None,
                Service::Rules => response
                    .bytes()
                    .await
                    .ok()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            };
            debug!(target: WIRE_TARGET, "<- {} {}: HTTP {} {:?}", url, action, status, body);
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                self.timeout_error(url)
            } else {
                TransportError::Body {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }
        })?;
        let body = String::from_utf8_lossy(&bytes).into_owned();
        debug!(target: WIRE_TARGET, "<- {} {}: {}", url, action, body);
        Ok(body)
    }

    fn map_send_error(&self, url: &str, err: reqwest::Error) -> PlugSrvError {
        if err.is_timeout() {
            self.timeout_error(url)
        } else {
            TransportError::Connect {
                url: url.to_string(),
                reason: err.to_string(),
            }
            .into()
        }
    }

    fn timeout_error(&self, url: &str) -> PlugSrvError {
        PlugSrvError::Timeout {
            url: url.to_string(),
            secs: self.timeout.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soap_action_header() {
        assert_eq!(
            soap_action(Service::BasicEvent, "GetBinaryState"),
            "\"urn:Belkin:service:basicevent:1#GetBinaryState\""
        );
        assert_eq!(
            soap_action(Service::Rules, "GetRules"),
            "\"urn:Belkin:service:rules:1#GetRules\""
        );
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = build_envelope(
            Service::BasicEvent,
            "SetBinaryState",
            "<BinaryState>1</BinaryState>",
        );
        assert!(envelope.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?><s:Envelope"));
        assert!(envelope.contains(
            "<u:SetBinaryState xmlns:u=\"urn:Belkin:service:basicevent:1\">\
             <BinaryState>1</BinaryState></u:SetBinaryState>"
        ));
        assert!(envelope.ends_with("</s:Body></s:Envelope>"));
    }
}
