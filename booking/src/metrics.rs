//! Business metrics for class bookings.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `class_booking_bookings_total{status}` - Bookings by status reached
//!   (confirmed, waitlisted, cancelled, attended, `no_show`)
//! - `class_booking_promotions_total` - Waitlisted bookings promoted to a seat
//! - `class_booking_check_ins_total` - Members checked in
//! - `class_booking_no_shows_total` - Members marked as no-show
//! - `class_booking_invariant_violations_total` - Occupancy counter found inconsistent
//!
//! ## Histograms
//! - `class_booking_operation_duration_seconds{operation}` - Time spent per service call

use crate::allocator::BookingAction;
use crate::types::BookingStatus;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus scrape endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr`
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Install the Prometheus recorder and start its HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed is tolerated.
    pub fn start(&self) -> Result<(), MetricsError> {
        register_booking_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install() {
            Ok(()) => {
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!(
                        "Metrics recorder already initialized, skipping re-initialization"
                    );
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }
}

/// Register descriptions for all booking metrics.
///
/// Call once at startup, before any metric is recorded.
pub fn register_booking_metrics() {
    describe_counter!(
        "class_booking_bookings_total",
        "Total number of bookings by status reached"
    );
    describe_counter!(
        "class_booking_promotions_total",
        "Total number of waitlisted bookings promoted to a seat"
    );
    describe_counter!(
        "class_booking_check_ins_total",
        "Total number of members checked in"
    );
    describe_counter!(
        "class_booking_no_shows_total",
        "Total number of members marked as no-show"
    );
    describe_counter!(
        "class_booking_invariant_violations_total",
        "Total number of occupancy invariant violations detected"
    );
    describe_histogram!(
        "class_booking_operation_duration_seconds",
        "Time taken by a booking service operation"
    );

    tracing::info!("Booking metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a booking reaching `status`.
pub fn record_booking_status(status: BookingStatus) {
    metrics::counter!("class_booking_bookings_total", "status" => status.as_str()).increment(1);
}

/// Record a waitlist promotion.
pub fn record_promotion() {
    metrics::counter!("class_booking_promotions_total").increment(1);
    record_booking_status(BookingStatus::Confirmed);
}

/// Record a check-in.
pub fn record_check_in() {
    metrics::counter!("class_booking_check_ins_total").increment(1);
    record_booking_status(BookingStatus::Attended);
}

/// Record a no-show.
pub fn record_no_show() {
    metrics::counter!("class_booking_no_shows_total").increment(1);
    record_booking_status(BookingStatus::NoShow);
}

/// Record a detected occupancy invariant violation.
pub fn record_invariant_violation() {
    metrics::counter!("class_booking_invariant_violations_total").increment(1);
}

/// Record how long a service operation took.
pub fn record_operation_duration(operation: &'static str, elapsed: Duration) {
    metrics::histogram!("class_booking_operation_duration_seconds", "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Record the metrics for one committed allocator event.
pub fn record_event(event: &BookingAction) {
    match event {
        BookingAction::BookingConfirmed { .. } => record_booking_status(BookingStatus::Confirmed),
        BookingAction::BookingWaitlisted { .. } => record_booking_status(BookingStatus::Waitlisted),
        BookingAction::BookingCancelled { .. } => record_booking_status(BookingStatus::Cancelled),
        BookingAction::WaitlistPromoted { .. } => record_promotion(),
        BookingAction::BookingCheckedIn { .. } => record_check_in(),
        BookingAction::BookingMarkedNoShow { .. } => record_no_show(),
        _ => {}
    }
}
