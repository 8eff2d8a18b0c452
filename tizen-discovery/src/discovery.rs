//! Search-driven discovery and description download.
//!
//! The iterator sends a single M-SEARCH, collects the replies until the read
//! timeout, deduplicates them by location and fetches the description of each
//! responder. Filtering by device type is left to the caller.

use crate::device::DeviceDescription;
use crate::error::{DiscoveryError, Result};
use crate::ssdp::{SsdpClient, SsdpResponse};
use std::collections::HashSet;
use std::time::Duration;

/// A search reply together with the outcome of fetching its description
#[derive(Debug)]
pub struct Discovered {
    pub response: SsdpResponse,
    pub description: Result<DeviceDescription>,
}

/// Blocking HTTP fetcher for device description documents
#[derive(Debug, Clone)]
pub struct DescriptionFetcher {
    http_client: reqwest::blocking::Client,
}

impl DescriptionFetcher {
    /// Create a fetcher whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    /// Fetch and parse the device description at `location`
    pub fn fetch(&self, location: &str) -> Result<DeviceDescription> {
        let response = self
            .http_client
            .get(location)
            .send()
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to fetch device description: {}", e)))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::NetworkError(format!(
                "Device description request failed: HTTP {}",
                response.status()
            )));
        }

        let xml = response
            .text()
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to read response body: {}", e)))?;

        DeviceDescription::from_xml(&xml)
    }
}

/// Iterator over devices answering one M-SEARCH.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use tizen_discovery::DiscoveryIterator;
///
/// let iter = DiscoveryIterator::new("urn:schemas-upnp-org:device:tizen:1", 5, Duration::from_secs(6))?;
/// for found in iter {
///     if let Ok(description) = found.description {
///         println!("{} at {}", description.friendly_name, found.response.location);
///     }
/// }
/// # Ok::<(), tizen_discovery::DiscoveryError>(())
/// ```
pub struct DiscoveryIterator {
    ssdp_client: Option<SsdpClient>,
    search_target: String,
    mx: u32,
    ssdp_buffer: Vec<SsdpResponse>,
    buffer_index: usize,
    seen_locations: HashSet<String>,
    fetcher: DescriptionFetcher,
}

impl DiscoveryIterator {
    /// Create a discovery iterator for `search_target`
    ///
    /// `timeout` bounds both the wait for search replies and each description fetch.
    pub fn new(search_target: &str, mx: u32, timeout: Duration) -> Result<Self> {
        Ok(Self {
            ssdp_client: Some(SsdpClient::new(timeout)?),
            search_target: search_target.to_string(),
            mx,
            ssdp_buffer: Vec::new(),
            buffer_index: 0,
            seen_locations: HashSet::new(),
            fetcher: DescriptionFetcher::new(timeout)?,
        })
    }

    fn fill_buffer(&mut self) -> Result<()> {
        if let Some(client) = self.ssdp_client.take() {
            let responses = client.search(&self.search_target, self.mx)?;
            self.ssdp_buffer.extend(responses.filter_map(|r| r.ok()));
        }
        Ok(())
    }
}

impl Iterator for DiscoveryIterator {
    type Item = Discovered;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ssdp_client.is_some() && self.fill_buffer().is_err() {
            return None;
        }

        while self.buffer_index < self.ssdp_buffer.len() {
            let response = self.ssdp_buffer[self.buffer_index].clone();
            self.buffer_index += 1;

            if !self.seen_locations.insert(response.location.clone()) {
                continue;
            }

            let description = self.fetcher.fetch(&response.location);
            return Some(Discovered {
                response,
                description,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_parses_served_description() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/description.xml")
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(
                r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:tizen:1</deviceType>
    <friendlyName>Bedroom TV</friendlyName>
    <modelName>Tizen</modelName>
    <UDN>uuid:tv-0042</UDN>
  </device>
</root>"#,
            )
            .create();

        let fetcher = DescriptionFetcher::new(Duration::from_secs(2)).unwrap();
        let description = fetcher
            .fetch(&format!("{}/description.xml", server.url()))
            .unwrap();

        mock.assert();
        assert_eq!(description.udn, "uuid:tv-0042");
        assert_eq!(description.friendly_name, "Bedroom TV");
    }

    #[test]
    fn test_fetcher_reports_http_errors() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/missing.xml").with_status(404).create();

        let fetcher = DescriptionFetcher::new(Duration::from_secs(2)).unwrap();
        let result = fetcher.fetch(&format!("{}/missing.xml", server.url()));

        assert!(matches!(result, Err(DiscoveryError::NetworkError(_))));
    }
}
