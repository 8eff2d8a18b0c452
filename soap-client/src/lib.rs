//! Private SOAP client for UPnP device communication
//!
//! This crate provides a minimal blocking client for the three request
//! families a UPnP control point issues against a device:
//!
//! - SOAP action invocations against a service control URL
//! - `QueryStateVariable` requests against the same control URL
//! - GENA `SUBSCRIBE` / renewal / `UNSUBSCRIBE` against a service event URL
//!
//! All URLs are absolute; resolving them from a device description is the
//! caller's job.

mod error;

pub use error::SoapError;

use std::time::Duration;
use xmltree::Element;

/// Namespace used by the standard UPnP control actions (`QueryStateVariable`)
pub const CONTROL_NAMESPACE: &str = "urn:schemas-upnp-org:control-1-0";

/// Response from a UPnP subscription request
#[derive(Debug, Clone)]
pub struct SubscriptionResponse {
    /// Subscription ID returned by the device
    pub sid: String,
    /// Actual timeout granted by the device (in seconds)
    pub timeout_seconds: u32,
}

/// A minimal SOAP client for UPnP device communication
#[derive(Debug, Clone)]
pub struct SoapClient {
    agent: ureq::Agent,
}

impl SoapClient {
    /// Create a new SOAP client with default configuration
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(10))
    }

    /// Create a SOAP client with explicit connect and read timeouts
    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .build(),
        }
    }

    /// Invoke a SOAP action and return the parsed `{action}Response` element
    ///
    /// # Arguments
    /// * `control_url` - Absolute control URL of the service
    /// * `service_type` - Service type URN, used as the action namespace
    /// * `action` - Action name (e.g. "SetVolume")
    /// * `arguments` - Ordered name/value pairs, serialized as child elements
    pub fn call(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        arguments: &[(String, String)],
    ) -> Result<Element, SoapError> {
        let payload: String = arguments
            .iter()
            .map(|(name, value)| format!("<{name}>{}</{name}>", escape_xml(value)))
            .collect();

        let xml = self.post(control_url, service_type, action, &payload)?;
        self.extract_response(&xml, action)
    }

    /// Query the current value of a state variable
    ///
    /// Uses the standard `QueryStateVariable` action from the UPnP control
    /// namespace and returns the content of its `return` element.
    pub fn query_state_variable(
        &self,
        control_url: &str,
        variable: &str,
    ) -> Result<String, SoapError> {
        let payload = format!("<u:varName>{}</u:varName>", escape_xml(variable));
        let xml = self.post(control_url, CONTROL_NAMESPACE, "QueryStateVariable", &payload)?;
        let response = self.extract_response(&xml, "QueryStateVariable")?;

        response
            .get_child("return")
            .map(|r| r.get_text().map(|t| t.into_owned()).unwrap_or_default())
            .ok_or_else(|| SoapError::Parse("Missing return element".to_string()))
    }

    /// Subscribe to UPnP events for a service
    ///
    /// Returns the SID and the timeout the device granted, which falls back
    /// to `timeout_seconds` when the response carries no `TIMEOUT` header.
    pub fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        let callback = format!("<{callback_url}>");
        let timeout = format!("Second-{timeout_seconds}");
        let response = self.gena(
            "SUBSCRIBE",
            event_url,
            &[("CALLBACK", &callback), ("NT", "upnp:event"), ("TIMEOUT", &timeout)],
        )?;

        let sid = response
            .header("SID")
            .map(str::to_string)
            .ok_or_else(|| SoapError::Parse("Missing SID header in SUBSCRIBE response".to_string()))?;

        Ok(SubscriptionResponse {
            sid,
            timeout_seconds: granted_timeout(&response, timeout_seconds),
        })
    }

    /// Renew an existing subscription, returning the granted timeout
    pub fn renew_subscription(
        &self,
        event_url: &str,
        sid: &str,
        timeout_seconds: u32,
    ) -> Result<u32, SoapError> {
        let timeout = format!("Second-{timeout_seconds}");
        let response = self.gena("SUBSCRIBE", event_url, &[("SID", sid), ("TIMEOUT", &timeout)])?;
        Ok(granted_timeout(&response, timeout_seconds))
    }

    /// Cancel a subscription
    pub fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), SoapError> {
        self.gena("UNSUBSCRIBE", event_url, &[("SID", sid)]).map(drop)
    }

    /// Issue a GENA request; anything but `200 OK` is an error
    fn gena(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<ureq::Response, SoapError> {
        let request = headers
            .iter()
            .fold(self.agent.request(method, url), |request, (name, value)| {
                request.set(name, value)
            });

        match request.call() {
            Ok(response) if response.status() == 200 => Ok(response),
            Ok(response) => Err(SoapError::Network(format!(
                "{method} failed: HTTP {}",
                response.status()
            ))),
            Err(ureq::Error::Status(code, _)) => {
                Err(SoapError::Network(format!("{method} failed: HTTP {code}")))
            }
            Err(e) => Err(SoapError::Network(e.to_string())),
        }
    }

    fn post(
        &self,
        url: &str,
        namespace: &str,
        action: &str,
        payload: &str,
    ) -> Result<Element, SoapError> {
        let body = build_envelope(namespace, action, payload);
        let soap_action = format!("\"{}#{}\"", namespace, action);

        // Devices report faults with HTTP 500, the body still carries the fault detail
        let response = match self
            .agent
            .post(url)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .set("SOAPACTION", &soap_action)
            .send_string(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(500, response)) => response,
            Err(e) => return Err(SoapError::Network(e.to_string())),
        };

        let xml_text = response
            .into_string()
            .map_err(|e| SoapError::Network(e.to_string()))?;

        Element::parse(xml_text.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))
    }

    fn extract_response(&self, xml: &Element, action: &str) -> Result<Element, SoapError> {
        let body = xml
            .get_child("Body")
            .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))?;

        if let Some(fault) = body.get_child("Fault") {
            let error_code = fault
                .get_child("detail")
                .and_then(|d| d.get_child("UPnPError").or_else(|| d.get_child("UpnPError")))
                .and_then(|e| e.get_child("errorCode"))
                .and_then(|c| c.get_text())
                .and_then(|t| t.trim().parse::<u16>().ok())
                .unwrap_or(500);
            return Err(SoapError::Fault(error_code));
        }

        let response_name = format!("{}Response", action);
        body.get_child(response_name.as_str())
            .cloned()
            .ok_or_else(|| SoapError::Parse(format!("Missing {} element", response_name)))
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a SOAP 1.1 envelope around a single action element
pub fn build_envelope(namespace: &str, action: &str, payload: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{namespace}">{payload}</u:{action}></s:Body></s:Envelope>"#
    )
}

fn granted_timeout(response: &ureq::Response, requested: u32) -> u32 {
    response
        .header("TIMEOUT")
        .and_then(parse_timeout_header)
        .unwrap_or(requested)
}

/// Parse a GENA `TIMEOUT` header value such as `Second-1800`
///
/// `Second-infinite` is reported as `u32::MAX`.
pub fn parse_timeout_header(value: &str) -> Option<u32> {
    let rest = value.trim().strip_prefix("Second-")?;
    if rest.eq_ignore_ascii_case("infinite") {
        return Some(u32::MAX);
    }
    rest.parse::<u32>().ok()
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soap_client_creation() {
        let _client = SoapClient::new();
        let _default_client = SoapClient::default();
    }

    #[test]
    fn test_build_envelope_wraps_action() {
        let envelope = build_envelope(
            "urn:schemas-upnp-org:service:tizencontrol:1",
            "SetVolume",
            "<Volume>7</Volume>",
        );

        let xml = Element::parse(envelope.as_bytes()).unwrap();
        let action = xml
            .get_child("Body")
            .and_then(|b| b.get_child("SetVolume"))
            .expect("action element");
        assert_eq!(
            action.namespace.as_deref(),
            Some("urn:schemas-upnp-org:service:tizencontrol:1")
        );
        assert_eq!(
            action.get_child("Volume").and_then(|v| v.get_text()).as_deref(),
            Some("7")
        );
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
        assert_eq!(escape_xml("plain"), "plain");
    }

    #[test]
    fn test_parse_timeout_header() {
        assert_eq!(parse_timeout_header("Second-1801"), Some(1801));
        assert_eq!(parse_timeout_header(" Second-300 "), Some(300));
        assert_eq!(parse_timeout_header("Second-infinite"), Some(u32::MAX));
        assert_eq!(parse_timeout_header("Minute-5"), None);
        assert_eq!(parse_timeout_header("Second-abc"), None);
    }

    #[test]
    fn test_extract_response_with_valid_response() {
        let client = SoapClient::new();

        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:PowerOnResponse xmlns:u="urn:schemas-upnp-org:service:tizencontrol:1">
                    </u:PowerOnResponse>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        let response = client.extract_response(&xml, "PowerOn").unwrap();
        assert_eq!(response.name, "PowerOnResponse");
    }

    #[test]
    fn test_extract_query_state_variable_return() {
        let client = SoapClient::new();

        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:QueryStateVariableResponse xmlns:u="urn:schemas-upnp-org:control-1-0">
                        <return>42</return>
                    </u:QueryStateVariableResponse>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        let response = client.extract_response(&xml, "QueryStateVariable").unwrap();
        assert_eq!(
            response.get_child("return").and_then(|r| r.get_text()).as_deref(),
            Some("42")
        );
    }

    #[test]
    fn test_extract_response_with_soap_fault() {
        let client = SoapClient::new();

        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Client</faultcode>
                        <faultstring>UPnPError</faultstring>
                        <detail>
                            <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
                                <errorCode>401</errorCode>
                                <errorDescription>Invalid Action</errorDescription>
                            </UPnPError>
                        </detail>
                    </s:Fault>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match client.extract_response(&xml, "PowerOn").unwrap_err() {
            SoapError::Fault(code) => assert_eq!(code, 401),
            other => panic!("Expected SoapError::Fault, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_response_missing_body() {
        let client = SoapClient::new();

        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match client.extract_response(&xml, "PowerOn").unwrap_err() {
            SoapError::Parse(msg) => assert!(msg.contains("Missing SOAP Body")),
            other => panic!("Expected SoapError::Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_response_missing_action_response() {
        let client = SoapClient::new();

        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match client.extract_response(&xml, "SetChannel").unwrap_err() {
            SoapError::Parse(msg) => assert!(msg.contains("Missing SetChannelResponse element")),
            other => panic!("Expected SoapError::Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_soap_fault_with_default_error_code() {
        let client = SoapClient::new();

        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Server</faultcode>
                        <faultstring>Internal Error</faultstring>
                    </s:Fault>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match client.extract_response(&xml, "PowerOn").unwrap_err() {
            SoapError::Fault(code) => assert_eq!(code, 500),
            other => panic!("Expected SoapError::Fault, got {other:?}"),
        }
    }
}
