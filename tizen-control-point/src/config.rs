//! Configuration types for the control point
//!
//! This module defines the settings that control device filtering, the
//! advertisement sweep, subscriptions and the network transport.

use std::time::Duration;

use crate::error::{ControlPointError, Result};

/// Configuration for the ControlPoint
#[derive(Debug, Clone)]
pub struct ControlPointConfig {
    /// Device type searched for and accepted
    /// Default: "urn:schemas-upnp-org:device:tizen:1"
    pub device_type: String,

    /// Required `modelName` of accepted devices
    /// Default: "Tizen"
    pub model_name: String,

    /// Interval of the advertisement timeout sweep
    /// Default: 30 seconds
    pub sweep_interval: Duration,

    /// Timeout requested for every subscription, in seconds
    /// Default: 1801
    pub subscription_timeout_secs: u32,

    /// MX value for type-wide searches, in seconds
    /// Default: 5
    pub search_mx: u32,

    /// Port range for the callback server
    /// Default: (3400, 3500)
    pub callback_port_range: (u16, u16),

    /// Timeout for outbound HTTP requests (descriptions, SOAP, GENA)
    /// Default: 10 seconds
    pub http_timeout: Duration,

    /// Listen for SSDP alive/byebye advertisements on port 1900
    /// Default: true
    pub listen_for_advertisements: bool,

    /// How often granted subscriptions are checked for renewal
    /// Default: 10 seconds
    pub renewal_check_interval: Duration,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            device_type: tizen_discovery::TIZEN_DEVICE_TYPE.to_string(),
            model_name: "Tizen".to_string(),
            sweep_interval: Duration::from_secs(30),
            subscription_timeout_secs: 1801,
            search_mx: 5,
            callback_port_range: (3400, 3500),
            http_timeout: Duration::from_secs(10),
            listen_for_advertisements: true,
            renewal_check_interval: Duration::from_secs(10),
        }
    }
}

impl ControlPointConfig {
    /// Create a new ControlPointConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Search-only configuration that never binds the SSDP port
    pub fn search_only() -> Self {
        Self {
            listen_for_advertisements: false,
            ..Default::default()
        }
    }

    /// Apply `TIZEN_*` environment overrides on top of the defaults
    ///
    /// - `TIZEN_SWEEP_INTERVAL_SECS`
    /// - `TIZEN_SUBSCRIPTION_TIMEOUT_SECS`
    /// - `TIZEN_SEARCH_MX`
    /// - `TIZEN_CALLBACK_PORTS` as `start-end`
    /// - `TIZEN_LISTEN_SSDP` as `true`/`false`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(secs) = lookup("TIZEN_SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(parse_number("TIZEN_SWEEP_INTERVAL_SECS", &secs)?);
        }
        if let Some(secs) = lookup("TIZEN_SUBSCRIPTION_TIMEOUT_SECS") {
            config.subscription_timeout_secs = parse_number("TIZEN_SUBSCRIPTION_TIMEOUT_SECS", &secs)?;
        }
        if let Some(mx) = lookup("TIZEN_SEARCH_MX") {
            config.search_mx = parse_number("TIZEN_SEARCH_MX", &mx)?;
        }
        if let Some(ports) = lookup("TIZEN_CALLBACK_PORTS") {
            let (start, end) = ports.split_once('-').ok_or_else(|| {
                ControlPointError::Configuration(format!(
                    "TIZEN_CALLBACK_PORTS must look like start-end, got {ports}"
                ))
            })?;
            config.callback_port_range = (
                parse_number("TIZEN_CALLBACK_PORTS", start)?,
                parse_number("TIZEN_CALLBACK_PORTS", end)?,
            );
        }
        if let Some(listen) = lookup("TIZEN_LISTEN_SSDP") {
            config.listen_for_advertisements = listen.trim().parse().map_err(|_| {
                ControlPointError::Configuration(format!("TIZEN_LISTEN_SSDP must be true or false, got {listen}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.device_type.trim().is_empty() || self.model_name.trim().is_empty() {
            return Err(ControlPointError::Configuration(
                "Device type and model name filters must not be empty".to_string(),
            ));
        }

        if self.sweep_interval.as_secs() == 0 {
            return Err(ControlPointError::Configuration(
                "Sweep interval must be at least one second".to_string(),
            ));
        }

        if self.subscription_timeout_secs == 0 {
            return Err(ControlPointError::Configuration(
                "Subscription timeout must be greater than 0".to_string(),
            ));
        }

        if self.callback_port_range.0 > self.callback_port_range.1 {
            return Err(ControlPointError::Configuration(
                "Invalid callback port range: start must not exceed end".to_string(),
            ));
        }

        if self.http_timeout == Duration::ZERO || self.renewal_check_interval == Duration::ZERO {
            return Err(ControlPointError::Configuration(
                "HTTP timeout and renewal check interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Sweep interval in whole seconds, the unit advertisement lifetimes use
    pub fn sweep_increment(&self) -> i64 {
        i64::try_from(self.sweep_interval.as_secs()).unwrap_or(i64::MAX)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ControlPointError::Configuration(format!("{key}: not a number: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ControlPointConfig::default();
        assert_eq!(config.device_type, "urn:schemas-upnp-org:device:tizen:1");
        assert_eq!(config.model_name, "Tizen");
        assert_eq!(config.sweep_increment(), 30);
        assert_eq!(config.subscription_timeout_secs, 1801);
        assert_eq!(config.search_mx, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_search_only_preset() {
        assert!(!ControlPointConfig::search_only().listen_for_advertisements);
    }

    #[test]
    fn test_env_overrides() {
        let config = ControlPointConfig::from_lookup(lookup(&[
            ("TIZEN_SWEEP_INTERVAL_SECS", "15"),
            ("TIZEN_SUBSCRIPTION_TIMEOUT_SECS", "600"),
            ("TIZEN_SEARCH_MX", "2"),
            ("TIZEN_CALLBACK_PORTS", "4000-4010"),
            ("TIZEN_LISTEN_SSDP", "false"),
        ]))
        .unwrap();

        assert_eq!(config.sweep_interval, Duration::from_secs(15));
        assert_eq!(config.subscription_timeout_secs, 600);
        assert_eq!(config.search_mx, 2);
        assert_eq!(config.callback_port_range, (4000, 4010));
        assert!(!config.listen_for_advertisements);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        assert!(ControlPointConfig::from_lookup(lookup(&[("TIZEN_SEARCH_MX", "five")])).is_err());
        assert!(ControlPointConfig::from_lookup(lookup(&[("TIZEN_CALLBACK_PORTS", "4000")])).is_err());
        assert!(ControlPointConfig::from_lookup(lookup(&[("TIZEN_SWEEP_INTERVAL_SECS", "0")])).is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = ControlPointConfig::default();
        config.callback_port_range = (3500, 3400);
        assert!(config.validate().is_err());

        let mut config = ControlPointConfig::default();
        config.model_name = String::new();
        assert!(config.validate().is_err());

        let mut config = ControlPointConfig::default();
        config.subscription_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
