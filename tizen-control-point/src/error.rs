//! Error types for the control point.

/// Errors surfaced by control point operations.
///
/// Apart from [`ControlPointError::TransportInit`] at startup, none of these
/// are fatal: callers get a status back and the registry stays consistent.
#[derive(Debug, thiserror::Error)]
pub enum ControlPointError {
    /// Bad ordinal, unknown UDN, or a service that was never resolved
    #[error("Not found: {0}")]
    NotFound(String),

    /// The transport refused to start an outbound action or query
    #[error("Dispatch of {action} failed: {reason}")]
    DispatchFailed {
        /// Action or variable name
        action: String,
        /// Transport-provided reason
        reason: String,
    },

    /// A subscribe request could not be issued; the device stays registered
    #[error("Subscription to {event_url} failed: {reason}")]
    SubscriptionFailed {
        /// Publisher (event subscription) URL
        event_url: String,
        /// Transport-provided reason
        reason: String,
    },

    /// Description lacks required data or is not the expected device type
    #[error("Malformed description: {0}")]
    MalformedDescription(String),

    /// A change document could not be parsed
    #[error("Invalid change document: {0}")]
    InvalidChangeDocument(String),

    /// The transport could not be started
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ControlPointError {
    /// Helper for ordinal lookups that fall outside the registry
    pub fn no_device_at(ordinal: usize, len: usize) -> Self {
        Self::NotFound(format!("no device at ordinal {ordinal} ({len} registered)"))
    }
}

/// Immediate rejection of an outbound request by a [`crate::Transport`].
///
/// `Clone` so that it can travel inside completion events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Network or HTTP failure
    #[error("Network error: {0}")]
    Network(String),

    /// The peer answered with an error (SOAP fault, HTTP status)
    #[error("Rejected by device: {0}")]
    Rejected(String),

    /// The transport has been shut down
    #[error("Transport closed")]
    Closed,
}

/// Convenience Result type alias for control point operations.
pub type Result<T> = std::result::Result<T, ControlPointError>;
