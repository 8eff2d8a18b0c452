//! Tizen device discovery library
//!
//! This crate covers the discovery half of a UPnP control point:
//! SSDP search (type-wide or targeted at a single UDN), SSDP advertisement
//! listening, and downloading and parsing device description documents.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use tizen_discovery::{search, TIZEN_DEVICE_TYPE};
//!
//! for found in search(TIZEN_DEVICE_TYPE, 3, Duration::from_secs(4))? {
//!     println!("{} -> {}", found.usn, found.location);
//! }
//! # Ok::<(), tizen_discovery::DiscoveryError>(())
//! ```

mod error;
mod ssdp;
pub mod device;
mod discovery;

pub use device::{resolve_url, DeviceDescription, ResolvedService, ServiceDescription};
pub use discovery::{DescriptionFetcher, Discovered, DiscoveryIterator};
pub use error::{DiscoveryError, Result};
pub use ssdp::{
    parse_max_age, parse_notification, parse_ssdp_response, udn_from_usn, NotificationKind,
    SsdpClient, SsdpListener, SsdpNotification, SsdpResponse, DEFAULT_MAX_AGE,
};

use std::collections::HashSet;
use std::time::Duration;

/// Device type advertised by Tizen televisions
pub const TIZEN_DEVICE_TYPE: &str = "urn:schemas-upnp-org:device:tizen:1";

/// Send one M-SEARCH and collect the replies, deduplicated by location.
///
/// # Arguments
///
/// * `search_target` - Device type URN or `uuid:` UDN
/// * `mx` - Maximum response delay in seconds
/// * `timeout` - How long to wait for replies after the last one arrived
pub fn search(search_target: &str, mx: u32, timeout: Duration) -> Result<Vec<SsdpResponse>> {
    let client = SsdpClient::new(timeout)?;
    let mut seen = HashSet::new();

    let responses = client
        .search(search_target, mx)?
        .filter_map(|r| r.ok())
        .filter(|r| seen.insert(r.location.clone()))
        .collect();
    Ok(responses)
}
