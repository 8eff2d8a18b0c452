//! Test helpers for fixture-based integration tests

use std::fs;
use std::path::PathBuf;

/// Represents a test fixture with device XML data
#[derive(Debug, Clone)]
pub struct DeviceFixture {
    pub name: String,
    pub host: String,
    pub xml_content: String,
}

impl DeviceFixture {
    /// Load a fixture from the fixtures directory
    pub fn load(filename: &str, host: &str) -> Self {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("tests/fixtures");
        path.push(filename);

        let xml_content = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", filename, e));

        Self {
            name: filename.to_string(),
            host: host.to_string(),
            xml_content,
        }
    }

    /// Get the SSDP location URL for this device
    pub fn location_url(&self) -> String {
        format!("http://{}/description.xml", self.host)
    }

    /// Create a mock SSDP search response for this device
    pub fn ssdp_response(&self, udn: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\n\
             CACHE-CONTROL: max-age = 1801\r\n\
             EXT:\r\n\
             LOCATION: {}\r\n\
             SERVER: Linux/4.1 UPnP/1.0 Tizen/1.0\r\n\
             ST: urn:schemas-upnp-org:device:tizen:1\r\n\
             USN: {}::urn:schemas-upnp-org:device:tizen:1\r\n\r\n",
            self.location_url(),
            udn
        )
    }

    /// Create a mock SSDP alive advertisement for this device
    pub fn ssdp_alive(&self, udn: &str, max_age: u32) -> String {
        format!(
            "NOTIFY * HTTP/1.1\r\n\
             HOST: 239.255.255.250:1900\r\n\
             CACHE-CONTROL: max-age={}\r\n\
             LOCATION: {}\r\n\
             NT: urn:schemas-upnp-org:device:tizen:1\r\n\
             NTS: ssdp:alive\r\n\
             USN: {}::urn:schemas-upnp-org:device:tizen:1\r\n\r\n",
            max_age,
            self.location_url(),
            udn
        )
    }
}
