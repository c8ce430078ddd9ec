//! Domain types for class booking.
//!
//! Identifiers, status enums and the receipts returned to callers. The two
//! entities live next to the component that owns them: [`ClassSession`] in
//! [`crate::registry`] and [`Booking`] in [`crate::ledger`].
//!
//! [`ClassSession`]: crate::registry::ClassSession
//! [`Booking`]: crate::ledger::Booking

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a scheduled class session
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random `SessionId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `SessionId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a booking
///
/// Ordered, so two bookings requested at the same instant still promote in a
/// deterministic order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a gym member
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    /// Creates a new random `MemberId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `MemberId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Number of seats in a class session
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Capacity(u32);

impl Capacity {
    /// Creates a new capacity
    #[must_use]
    pub const fn new(seats: u32) -> Self {
        Self(seats)
    }

    /// Returns the seat count
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} seats", self.0)
    }
}

/// Booking status
///
/// `Confirmed`, `Attended` and `NoShow` hold a seat: the class already ran,
/// so a no-show keeps the seat it was given. `Confirmed`, `Waitlisted` and
/// `Attended` are active: a member may hold at most one active booking per
/// session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Counted against session capacity
    Confirmed,
    /// Recorded, waiting for a seat
    Waitlisted,
    /// Cancelled by the member or staff
    Cancelled,
    /// Checked in by staff
    Attended,
    /// Did not show up
    NoShow,
}

impl BookingStatus {
    /// Whether the booking blocks the member from booking the session again
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Confirmed | Self::Waitlisted | Self::Attended)
    }

    /// Whether the booking is counted in the session's occupancy
    #[must_use]
    pub const fn holds_seat(self) -> bool {
        matches!(self, Self::Confirmed | Self::Attended | Self::NoShow)
    }

    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Attended | Self::NoShow)
    }

    /// Wire name, as used in metric labels and JSON
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Waitlisted => "waitlisted",
            Self::Cancelled => "cancelled",
            Self::Attended => "attended",
            Self::NoShow => "no_show",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle status
///
/// Sessions are never deleted; closing one keeps its booking history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting bookings
    Open,
    /// Soft-closed; no further bookings
    Closed,
}

// ============================================================================
// Receipts
// ============================================================================

/// Result of a booking request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingReceipt {
    /// The booking that was created
    pub booking_id: BookingId,
    /// Either `Confirmed` or `Waitlisted`
    pub status: BookingStatus,
}

/// Result of a cancellation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationReceipt {
    /// The cancelled booking
    pub booking_id: BookingId,
    /// Always `Cancelled`
    pub status: BookingStatus,
    /// Waitlisted booking that took the freed seat, if any
    pub promoted: Option<BookingId>,
}

/// Result of a staff status change (check-in, no-show)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReceipt {
    /// The booking that changed
    pub booking_id: BookingId,
    /// Its new status
    pub status: BookingStatus,
}

/// Result of closing a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureReceipt {
    /// The closed session
    pub session_id: SessionId,
    /// Bookings cancelled by the closure, ordered by request time
    pub cancelled: Vec<BookingId>,
}

/// Live occupancy of a session, for capacity bars
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    /// Confirmed, attended and no-show bookings
    pub current_bookings: u32,
    /// Total seats
    pub capacity: u32,
}

impl Occupancy {
    /// Free seats
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.current_bookings)
    }

    /// Whether every seat is taken
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current_bookings >= self.capacity
    }
}
