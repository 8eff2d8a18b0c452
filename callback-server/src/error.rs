//! Error types for the callback server

use thiserror::Error;

/// Errors that can occur while starting the callback server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Every port in the configured range is taken
    #[error("No available port found in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },

    /// The HTTP server task exited before signalling readiness
    #[error("Server failed to start")]
    StartFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ServerError::NoAvailablePort { start: 3400, end: 3500 }.to_string(),
            "No available port found in range 3400-3500"
        );
        assert_eq!(ServerError::StartFailed.to_string(), "Server failed to start");
    }
}
