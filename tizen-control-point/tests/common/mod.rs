//! Shared fixtures for control point integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use tizen_control_point::{
    CallbackRouter, ControlPointConfig, DeviceDescription, DeviceRegistry, Discovery, Notifier,
    ProtocolEvent, RecordingTransport, StateUpdateIterator, SubscriptionNotice,
};

pub const CONTROL_TYPE: &str = "urn:schemas-upnp-org:service:tizencontrol:1";
pub const PICTURE_TYPE: &str = "urn:schemas-upnp-org:service:tizenpicture:1";

/// Description location of the TV numbered `n`
pub fn location(n: usize) -> String {
    format!("http://192.168.1.{}:7676/description.xml", 10 + n)
}

/// Event subscription URL of a service on the TV numbered `n`
pub fn event_url(n: usize, service: &str) -> String {
    format!("http://192.168.1.{}:7676/upnp/event/{service}", 10 + n)
}

/// Control URL of a service on the TV numbered `n`
pub fn control_url(n: usize, service: &str) -> String {
    format!("http://192.168.1.{}:7676/upnp/control/{service}", 10 + n)
}

/// Description of a Tizen TV offering both services
pub fn tv_description(udn: &str) -> DeviceDescription {
    let xml = format!(
        r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:tizen:1</deviceType>
    <friendlyName>Living Room TV</friendlyName>
    <manufacturer>Samsung</manufacturer>
    <modelName>Tizen</modelName>
    <UDN>{udn}</UDN>
    <serviceList>
      <service>
        <serviceType>{CONTROL_TYPE}</serviceType>
        <serviceId>urn:upnp-org:serviceId:tizencontrol1</serviceId>
        <controlURL>/upnp/control/tvcontrol</controlURL>
        <eventSubURL>/upnp/event/tvcontrol</eventSubURL>
      </service>
      <service>
        <serviceType>{PICTURE_TYPE}</serviceType>
        <serviceId>urn:upnp-org:serviceId:tizenpicture1</serviceId>
        <controlURL>/upnp/control/tvpicture</controlURL>
        <eventSubURL>/upnp/event/tvpicture</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#
    );
    DeviceDescription::from_xml(&xml).unwrap()
}

/// An `ssdp:alive` for the TV numbered `n`
pub fn alive(n: usize, udn: &str, expires: i64) -> ProtocolEvent {
    ProtocolEvent::DiscoveryAlive(Discovery {
        device_id: udn.to_string(),
        location: location(n),
        expires,
        description: Ok(tv_description(udn)),
    })
}

/// A successful subscribe completion
pub fn subscribed(n: usize, service: &str, sid: &str) -> ProtocolEvent {
    ProtocolEvent::SubscribeComplete(SubscriptionNotice::granted(&event_url(n, service), sid, 1801))
}

/// Registry and router over a recording transport
pub struct Harness {
    pub transport: Arc<RecordingTransport>,
    pub registry: Arc<DeviceRegistry>,
    pub router: CallbackRouter,
    pub updates: StateUpdateIterator,
}

impl Harness {
    pub fn new() -> Self {
        let transport = Arc::new(RecordingTransport::new());
        let (notifier, updates) = Notifier::channel();
        let registry = Arc::new(DeviceRegistry::new(
            transport.clone(),
            notifier.clone(),
            &ControlPointConfig::search_only(),
        ));
        let router = CallbackRouter::new(registry.clone(), notifier);
        Self {
            transport,
            registry,
            router,
            updates,
        }
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}
