//! SSDP (Simple Service Discovery Protocol) search and advertisement handling
//!
//! Two sockets are involved on the control point side:
//!
//! - [`SsdpClient`] binds an ephemeral port, sends M-SEARCH and reads the
//!   unicast `HTTP/1.1 200 OK` replies.
//! - [`SsdpListener`] binds port 1900 and joins the multicast group to
//!   receive `NOTIFY` advertisements (`ssdp:alive` / `ssdp:byebye`).

use crate::error::{DiscoveryError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, trace};

/// SSDP multicast group
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
/// SSDP port
pub const SSDP_PORT: u16 = 1900;
/// Advertisement lifetime assumed when `CACHE-CONTROL` is missing or malformed
pub const DEFAULT_MAX_AGE: u32 = 1800;

/// SSDP search response containing device information
#[derive(Debug, Clone, PartialEq)]
pub struct SsdpResponse {
    pub location: String,
    pub st: String,
    pub usn: String,
    pub server: Option<String>,
    /// Advertisement lifetime in seconds from `CACHE-CONTROL: max-age`
    pub max_age: u32,
}

/// Kind of a `NOTIFY` advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Alive,
    ByeBye,
}

/// A parsed SSDP `NOTIFY` advertisement
#[derive(Debug, Clone, PartialEq)]
pub struct SsdpNotification {
    pub kind: NotificationKind,
    pub nt: String,
    pub usn: String,
    /// Present for `ssdp:alive` only
    pub location: Option<String>,
    pub max_age: u32,
}

/// SSDP client for device search
pub struct SsdpClient {
    socket: UdpSocket,
}

impl SsdpClient {
    /// Create a new SSDP client with the specified read timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to bind UDP socket: {}", e)))?;

        socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to set read timeout: {}", e)))?;

        socket
            .set_multicast_loop_v4(true)
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to set multicast loop: {}", e)))?;

        Ok(Self { socket })
    }

    /// Send an M-SEARCH request and return an iterator of responses
    ///
    /// # Arguments
    ///
    /// * `search_target` - `ST` value: a device type URN or a `uuid:` UDN
    /// * `mx` - Maximum response delay devices may use, in seconds (at least 1)
    pub fn search(&self, search_target: &str, mx: u32) -> Result<SsdpResponseIterator<'_>> {
        let request = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             USER-AGENT: tizen-rs/1.0 UPnP/1.0\r\n\
             \r\n",
            SSDP_MULTICAST_ADDR,
            SSDP_PORT,
            mx.max(1),
            search_target
        );

        self.socket
            .send_to(request.as_bytes(), (SSDP_MULTICAST_ADDR, SSDP_PORT))
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to send M-SEARCH: {}", e)))?;

        debug!(st = search_target, mx, "M-SEARCH sent");
        Ok(SsdpResponseIterator::new(&self.socket))
    }
}

/// Iterator for SSDP search responses, ends when the socket read times out
pub struct SsdpResponseIterator<'a> {
    socket: &'a UdpSocket,
    buffer: [u8; 2048],
    finished: bool,
}

impl<'a> SsdpResponseIterator<'a> {
    fn new(socket: &'a UdpSocket) -> Self {
        Self {
            socket,
            buffer: [0; 2048],
            finished: false,
        }
    }
}

impl<'a> Iterator for SsdpResponseIterator<'a> {
    type Item = Result<SsdpResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((size, _)) => {
                    let Ok(text) = std::str::from_utf8(&self.buffer[..size]) else {
                        continue;
                    };
                    if let Some(response) = parse_ssdp_response(text) {
                        return Some(Ok(response));
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    self.finished = true;
                }
                Err(e) => {
                    return Some(Err(DiscoveryError::NetworkError(format!("Socket error: {}", e))));
                }
            }
        }
        None
    }
}

/// Multicast listener for SSDP advertisements
pub struct SsdpListener {
    socket: UdpSocket,
}

impl SsdpListener {
    /// Bind port 1900 (shared with other listeners) and join the SSDP group
    ///
    /// `poll_timeout` bounds each [`SsdpListener::recv`] call so the owning
    /// thread can observe shutdown.
    pub fn bind(poll_timeout: Duration) -> Result<Self> {
        let net_err = |what: &str, e: std::io::Error| {
            DiscoveryError::NetworkError(format!("{}: {}", what, e))
        };

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| net_err("Failed to create SSDP socket", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| net_err("Failed to set SO_REUSEADDR", e))?;

        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, SSDP_PORT));
        socket
            .bind(&bind_addr.into())
            .map_err(|e| net_err("Failed to bind SSDP port", e))?;

        let socket: UdpSocket = socket.into();
        socket
            .join_multicast_v4(&SSDP_MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| net_err("Failed to join SSDP multicast group", e))?;
        socket
            .set_read_timeout(Some(poll_timeout))
            .map_err(|e| net_err("Failed to set read timeout", e))?;

        debug!("SSDP listener bound on {}", bind_addr);
        Ok(Self { socket })
    }

    /// Wait for the next advertisement
    ///
    /// Returns `Ok(None)` when the poll timeout elapses or a datagram is not
    /// a well-formed `NOTIFY`.
    pub fn recv(&self) -> Result<Option<SsdpNotification>> {
        let mut buffer = [0u8; 4096];
        match self.socket.recv_from(&mut buffer) {
            Ok((size, from)) => {
                let text = String::from_utf8_lossy(&buffer[..size]);
                let parsed = parse_notification(&text);
                if parsed.is_none() {
                    trace!("Ignoring SSDP datagram from {}", from);
                }
                Ok(parsed)
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(DiscoveryError::NetworkError(format!("Socket error: {}", e))),
        }
    }
}

/// Parse an SSDP search response from HTTP text
pub fn parse_ssdp_response(response: &str) -> Option<SsdpResponse> {
    let mut lines = response.lines();
    if !lines.next()?.trim().to_ascii_uppercase().starts_with("HTTP/") {
        return None;
    }

    let mut location = None;
    let mut st = None;
    let mut usn = None;
    let mut server = None;
    let mut max_age = DEFAULT_MAX_AGE;

    for line in lines {
        let line = line.trim();

        if let Some(value) = extract_header_value(line, "LOCATION:") {
            location = Some(value);
        } else if let Some(value) = extract_header_value(line, "ST:") {
            st = Some(value);
        } else if let Some(value) = extract_header_value(line, "USN:") {
            usn = Some(value);
        } else if let Some(value) = extract_header_value(line, "SERVER:") {
            server = Some(value);
        } else if let Some(value) = extract_header_value(line, "CACHE-CONTROL:") {
            max_age = parse_max_age(&value).unwrap_or(DEFAULT_MAX_AGE);
        }
    }

    Some(SsdpResponse {
        location: location?,
        st: st?,
        usn: usn?,
        server,
        max_age,
    })
}

/// Parse an SSDP `NOTIFY` advertisement
pub fn parse_notification(message: &str) -> Option<SsdpNotification> {
    let mut lines = message.lines();
    if !lines.next()?.trim().to_ascii_uppercase().starts_with("NOTIFY ") {
        return None;
    }

    let mut nt = None;
    let mut nts = None;
    let mut usn = None;
    let mut location = None;
    let mut max_age = DEFAULT_MAX_AGE;

    for line in lines {
        let line = line.trim();

        if let Some(value) = extract_header_value(line, "NTS:") {
            nts = Some(value);
        } else if let Some(value) = extract_header_value(line, "NT:") {
            nt = Some(value);
        } else if let Some(value) = extract_header_value(line, "USN:") {
            usn = Some(value);
        } else if let Some(value) = extract_header_value(line, "LOCATION:") {
            location = Some(value);
        } else if let Some(value) = extract_header_value(line, "CACHE-CONTROL:") {
            max_age = parse_max_age(&value).unwrap_or(DEFAULT_MAX_AGE);
        }
    }

    let kind = match nts?.to_ascii_lowercase().as_str() {
        "ssdp:alive" => NotificationKind::Alive,
        "ssdp:byebye" => NotificationKind::ByeBye,
        _ => return None,
    };

    if kind == NotificationKind::Alive && location.is_none() {
        return None;
    }

    Some(SsdpNotification {
        kind,
        nt: nt?,
        usn: usn?,
        location,
        max_age,
    })
}

/// Parse `max-age` out of a `CACHE-CONTROL` value such as `max-age = 1800`
pub fn parse_max_age(value: &str) -> Option<u32> {
    value.split(',').find_map(|directive| {
        let (name, seconds) = directive.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            seconds.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Extract the device UDN from a USN such as `uuid:abc::urn:...`
pub fn udn_from_usn(usn: &str) -> &str {
    usn.split("::").next().unwrap_or(usn).trim()
}

/// Extract header value from a line like "HEADER: value"
fn extract_header_value(line: &str, header: &str) -> Option<String> {
    if line.len() > header.len() && line[..header.len()].eq_ignore_ascii_case(header) {
        Some(line[header.len()..].trim().to_string())
    } else {
        None
    }
}
