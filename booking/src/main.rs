//! Class booking demo.
//!
//! Schedules a small class, lets a crowd of members race for it, then walks
//! through a cancellation with waitlist promotion and a check-in. State is
//! printed as JSON after each step.

use anyhow::Context;
use chrono::{Duration, Utc};
use class_booking::metrics::{register_booking_metrics, MetricsServer};
use class_booking::{
    BookingFilter, BookingService, BookingStatus, Config, InMemoryBookingStore, MemberId,
    NewSession,
};
use class_booking_core::environment::SystemClock;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("class_booking={}", config.telemetry.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.telemetry.metrics_enabled {
        MetricsServer::new(config.telemetry.metrics_addr())
            .start()
            .context("starting metrics exporter")?;
    } else {
        register_booking_metrics();
    }

    info!(?config, "Configuration loaded");

    let service = BookingService::new(
        Arc::new(InMemoryBookingStore::new()),
        Arc::new(SystemClock),
        config.booking,
    );

    let start = Utc::now() + Duration::days(1);
    let session = service
        .schedule_session(NewSession {
            title: "Morning Spin".to_string(),
            trainer: "Alex".to_string(),
            location: "Studio 2".to_string(),
            start_time: start,
            end_time: start + Duration::minutes(45),
            capacity: 5,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&session)?);

    // Eight members race for five seats.
    let mut members: Vec<MemberId> = (0..8).map(|_| MemberId::new()).collect();
    members.shuffle(&mut rand::thread_rng());

    let session_id = session.id();
    let requests = members.iter().map(|member| {
        let service = service.clone();
        let member = *member;
        async move { service.request_booking(session_id, member).await }
    });
    let receipts = futures::future::join_all(requests).await;

    let mut confirmed = Vec::new();
    for receipt in receipts {
        match receipt {
            Ok(receipt) if receipt.status == BookingStatus::Confirmed => {
                confirmed.push(receipt.booking_id);
            }
            Ok(receipt) => {
                info!(booking_id = %receipt.booking_id, status = %receipt.status, "Not seated");
            }
            Err(error) => warn!(%error, "Booking failed"),
        }
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&service.session_occupancy(session_id).await?)?
    );

    if let Some(first) = confirmed.first() {
        let cancellation = service.cancel_booking(*first).await?;
        println!("{}", serde_json::to_string_pretty(&cancellation)?);
    }

    if let Some(second) = confirmed.get(1) {
        let check_in = service.check_in(*second).await?;
        println!("{}", serde_json::to_string_pretty(&check_in)?);
    }

    let bookings = service
        .list_bookings(BookingFilter::Session(session_id), None)
        .await?;
    println!("{}", serde_json::to_string_pretty(&bookings)?);

    let occupancy = service.session_occupancy(session_id).await?;
    info!(
        current = occupancy.current_bookings,
        capacity = occupancy.capacity,
        waitlisted = bookings.iter().filter(|b| b.status == BookingStatus::Waitlisted).count(),
        "Demo finished"
    );

    Ok(())
}
