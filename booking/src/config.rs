//! Configuration for the booking service.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Booking rules
    pub booking: BookingConfig,
    /// Logging and metrics
    pub telemetry: TelemetryConfig,
}

/// Booking rules applied by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Maximum waitlist length per session (0 = unlimited)
    pub max_waitlist: u32,
    /// Reject `mark_no_show` until the session has started
    pub enforce_no_show_after_start: bool,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_waitlist: 0,
            enforce_no_show_after_start: true,
        }
    }
}

impl BookingConfig {
    /// Whether a waitlist of `len` entries has reached the configured limit
    #[must_use]
    pub const fn waitlist_is_full(&self, len: usize) -> bool {
        self.max_waitlist > 0 && len >= self.max_waitlist as usize
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Serve Prometheus metrics
    pub metrics_enabled: bool,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_host: "0.0.0.0".to_string(),
            metrics_port: 9090,
        }
    }
}

impl TelemetryConfig {
    /// Address for the metrics listener.
    ///
    /// Falls back to all interfaces when `metrics_host` is not an IP address.
    #[must_use]
    pub fn metrics_addr(&self) -> SocketAddr {
        let host = self
            .metrics_host
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(host, self.metrics_port)
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let booking_defaults = BookingConfig::default();
        let telemetry_defaults = TelemetryConfig::default();

        Self {
            booking: BookingConfig {
                max_waitlist: lookup("BOOKING_MAX_WAITLIST")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(booking_defaults.max_waitlist),
                enforce_no_show_after_start: lookup("BOOKING_ENFORCE_NO_SHOW_AFTER_START")
                    .and_then(|s| parse_bool(&s))
                    .unwrap_or(booking_defaults.enforce_no_show_after_start),
            },
            telemetry: TelemetryConfig {
                log_level: lookup("LOG_LEVEL").unwrap_or(telemetry_defaults.log_level),
                metrics_enabled: lookup("METRICS_ENABLED")
                    .and_then(|s| parse_bool(&s))
                    .unwrap_or(telemetry_defaults.metrics_enabled),
                metrics_host: lookup("METRICS_HOST").unwrap_or(telemetry_defaults.metrics_host),
                metrics_port: lookup("METRICS_PORT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(telemetry_defaults.metrics_port),
            },
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
