//! Session registry: schedule facts and the live occupancy counter.
//!
//! `current_bookings` is private to this module. The allocator changes it
//! through [`ClassSession::increment_occupancy`] and
//! [`ClassSession::decrement_occupancy`], which are only reachable inside the
//! crate and only ever called while the session's lock is held.

use crate::error::{BookingError, Result};
use crate::storage::BookingStore;
use crate::types::{Capacity, Occupancy, SessionId, SessionStatus};
use chrono::{DateTime, Utc};
use class_booking_core::environment::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Schedule facts for a session that is about to be published
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    /// Class name shown to members
    pub title: String,
    /// Trainer running the class
    pub trainer: String,
    /// Studio or room
    pub location: String,
    /// When the class starts
    pub start_time: DateTime<Utc>,
    /// When the class ends; must be after `start_time`
    pub end_time: DateTime<Utc>,
    /// Seats; must be positive
    pub capacity: u32,
}

/// A single scheduled occurrence of a class
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSession {
    id: SessionId,
    title: String,
    trainer: String,
    location: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    capacity: Capacity,
    current_bookings: u32,
    status: SessionStatus,
    created_at: DateTime<Utc>,
}

impl ClassSession {
    /// Validates `new_session` and builds an open session with no bookings.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidSession`] if the capacity is zero or the session
    /// does not end after it starts.
    pub fn schedule(
        id: SessionId,
        new_session: NewSession,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if new_session.capacity == 0 {
            return Err(BookingError::InvalidSession(
                "Capacity must be greater than zero".to_string(),
            ));
        }

        if new_session.end_time <= new_session.start_time {
            return Err(BookingError::InvalidSession(format!(
                "Session must end after it starts (start {}, end {})",
                new_session.start_time, new_session.end_time
            )));
        }

        Ok(Self {
            id,
            title: new_session.title,
            trainer: new_session.trainer,
            location: new_session.location,
            start_time: new_session.start_time,
            end_time: new_session.end_time,
            capacity: Capacity::new(new_session.capacity),
            current_bookings: 0,
            status: SessionStatus::Open,
            created_at,
        })
    }

    /// Session identifier
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Class name
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Trainer name
    #[must_use]
    pub fn trainer(&self) -> &str {
        &self.trainer
    }

    /// Studio or room
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Start time
    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// End time
    #[must_use]
    pub const fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Seat count
    #[must_use]
    pub const fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Confirmed, attended and no-show bookings
    #[must_use]
    pub const fn current_bookings(&self) -> u32 {
        self.current_bookings
    }

    /// Lifecycle status
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// When the session was published
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the session still takes bookings
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, SessionStatus::Open)
    }

    /// Whether the class has begun at `now`
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    /// Whether a seat is free
    #[must_use]
    pub const fn has_seat(&self) -> bool {
        self.current_bookings < self.capacity.value()
    }

    /// Snapshot for capacity-bar rendering
    #[must_use]
    pub const fn occupancy(&self) -> Occupancy {
        Occupancy {
            current_bookings: self.current_bookings,
            capacity: self.capacity.value(),
        }
    }

    /// Takes one seat.
    ///
    /// # Errors
    ///
    /// [`BookingError::CapacityExceeded`] when every seat is taken; the counter
    /// is left unchanged.
    pub(crate) fn increment_occupancy(&mut self) -> Result<()> {
        if !self.has_seat() {
            return Err(BookingError::CapacityExceeded(self.id));
        }
        self.current_bookings += 1;
        Ok(())
    }

    /// Frees one seat.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidState`] when the counter is already zero.
    pub(crate) fn decrement_occupancy(&mut self) -> Result<()> {
        if self.current_bookings == 0 {
            return Err(BookingError::InvalidState(format!(
                "session {} would drop below zero occupancy",
                self.id
            )));
        }
        self.current_bookings -= 1;
        Ok(())
    }

    pub(crate) const fn close(&mut self) {
        self.status = SessionStatus::Closed;
    }
}

/// Read and publish access to sessions
///
/// Occupancy changes never go through the registry; they happen inside the
/// allocator and are committed by the booking service.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    /// Creates a registry over `store`
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Loads a session.
    ///
    /// # Errors
    ///
    /// [`BookingError::SessionNotFound`] for an unknown id,
    /// [`BookingError::Storage`] if the store fails.
    pub async fn get_session(&self, id: SessionId) -> Result<ClassSession> {
        self.store
            .get_session(id)
            .await?
            .ok_or(BookingError::SessionNotFound(id))
    }

    /// Validates and publishes a new session.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidSession`] for bad schedule facts,
    /// [`BookingError::Storage`] if the store fails.
    pub async fn schedule(&self, new_session: NewSession) -> Result<ClassSession> {
        let session = ClassSession::schedule(SessionId::new(), new_session, self.clock.now())?;
        self.store.put_session(session.clone()).await?;

        tracing::info!(
            session_id = %session.id,
            title = %session.title,
            capacity = session.capacity.value(),
            start = %session.start_time,
            "Session scheduled"
        );

        Ok(session)
    }

    /// Current occupancy of a session.
    ///
    /// # Errors
    ///
    /// [`BookingError::SessionNotFound`] for an unknown id,
    /// [`BookingError::Storage`] if the store fails.
    pub async fn occupancy(&self, id: SessionId) -> Result<Occupancy> {
        Ok(self.get_session(id).await?.occupancy())
    }
}
