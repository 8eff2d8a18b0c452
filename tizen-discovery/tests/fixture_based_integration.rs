//! Fixture-based integration tests for Tizen device discovery
//!
//! These tests use device description fixtures to exercise parsing, type
//! filtering and URL resolution without real devices on the network.

mod helpers;

use helpers::DeviceFixture;
use mockito::Server;
use rstest::rstest;
use std::time::Duration;
use tizen_discovery::{
    parse_notification, parse_ssdp_response, udn_from_usn, DescriptionFetcher, DeviceDescription,
    NotificationKind, TIZEN_DEVICE_TYPE,
};

const CONTROL: &str = "urn:schemas-upnp-org:service:tizencontrol:1";
const PICTURE: &str = "urn:schemas-upnp-org:service:tizenpicture:1";

#[rstest]
#[case("tizen_tv_device.xml", "Living Room TV", "uuid:Upnp-TizenTV-1_0-1234567890001", true)]
#[case("tizen_tv_url_base.xml", "Kitchen TV", "uuid:Upnp-TizenTV-1_0-1234567890002", true)]
#[case("media_renderer_device.xml", "Soundbar", "uuid:acme-bar-5", false)]
fn test_parse_device_fixture(
    #[case] fixture_file: &str,
    #[case] expected_name: &str,
    #[case] expected_udn: &str,
    #[case] is_tizen: bool,
) {
    let fixture = DeviceFixture::load(fixture_file, "192.168.1.30:49152");
    let description = DeviceDescription::from_xml(&fixture.xml_content)
        .expect("Failed to parse device XML");

    assert_eq!(description.friendly_name, expected_name);
    assert_eq!(description.udn, expected_udn);
    assert_eq!(description.matches(TIZEN_DEVICE_TYPE, "Tizen"), is_tizen);
}

#[test]
fn test_services_resolve_against_location() {
    let fixture = DeviceFixture::load("tizen_tv_device.xml", "192.168.1.30:49152");
    let description = DeviceDescription::from_xml(&fixture.xml_content).unwrap();
    let location = fixture.location_url();

    let control = description.service(CONTROL, &location).unwrap();
    let picture = description.service(PICTURE, &location).unwrap();

    assert_eq!(control.event_url, "http://192.168.1.30:49152/upnp/event/tvcontrol1");
    assert_eq!(picture.control_url, "http://192.168.1.30:49152/upnp/control/tvpicture1");
    assert_eq!(
        description.resolved_presentation_url(&location),
        "http://192.168.1.30:49152/tvdevicepres.html"
    );
}

#[test]
fn test_url_base_takes_precedence_and_missing_service_is_none() {
    let fixture = DeviceFixture::load("tizen_tv_url_base.xml", "192.168.1.31:49152");
    let description = DeviceDescription::from_xml(&fixture.xml_content).unwrap();
    let location = fixture.location_url();

    let control = description.service(CONTROL, &location).unwrap();
    assert_eq!(control.control_url, "http://192.168.1.31:7676/upnp/control/tvcontrol1");
    assert!(description.service(PICTURE, &location).is_none());
}

#[test]
fn test_search_response_and_advertisement_from_fixture() {
    let fixture = DeviceFixture::load("tizen_tv_device.xml", "192.168.1.30:49152");
    let udn = "uuid:Upnp-TizenTV-1_0-1234567890001";

    let response = parse_ssdp_response(&fixture.ssdp_response(udn)).unwrap();
    assert_eq!(response.location, fixture.location_url());
    assert_eq!(response.max_age, 1801);
    assert_eq!(udn_from_usn(&response.usn), udn);

    let alive = parse_notification(&fixture.ssdp_alive(udn, 120)).unwrap();
    assert_eq!(alive.kind, NotificationKind::Alive);
    assert_eq!(alive.max_age, 120);
    assert_eq!(udn_from_usn(&alive.usn), udn);
}

#[test]
fn test_fetch_fixture_over_http() {
    let fixture = DeviceFixture::load("tizen_tv_device.xml", "unused");
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/description.xml")
        .with_status(200)
        .with_body(&fixture.xml_content)
        .create();

    let fetcher = DescriptionFetcher::new(Duration::from_secs(2)).unwrap();
    let location = format!("{}/description.xml", server.url());
    let description = fetcher.fetch(&location).unwrap();

    mock.assert();
    let control = description.service(CONTROL, &location).unwrap();
    assert!(control.control_url.starts_with(&server.url()));
}
