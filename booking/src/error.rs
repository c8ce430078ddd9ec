//! Error taxonomy for booking operations.

use crate::transitions::Transition;
use crate::types::{BookingId, BookingStatus, MemberId, SessionId};
use thiserror::Error;

/// Errors returned by booking operations
///
/// `SessionNotFound`, `BookingNotFound`, `DuplicateBooking`,
/// `InvalidTransition`, `SessionClosed`, `SessionStarted`, `WaitlistFull` and
/// `InvalidSession` are expected conditions that callers show to the user.
/// `InvalidState` means the occupancy counter disagrees with the ledger and
/// must be treated as a defect. `CapacityExceeded` never leaves the allocator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Unknown session id
    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    /// Unknown booking id
    #[error("Booking {0} not found")]
    BookingNotFound(BookingId),

    /// The member already holds an active booking for the session
    #[error("Member {member_id} already has booking {existing} for session {session_id}")]
    DuplicateBooking {
        /// Requesting member
        member_id: MemberId,
        /// Target session
        session_id: SessionId,
        /// The active booking that blocks the request
        existing: BookingId,
    },

    /// The requested status change is not in the transition table
    #[error("Cannot {attempted} booking {booking_id} while it is {from}")]
    InvalidTransition {
        /// Booking the change was attempted on
        booking_id: BookingId,
        /// Its current status
        from: BookingStatus,
        /// The rejected transition
        attempted: Transition,
    },

    /// No free seat; consumed by the allocator and turned into a waitlisted booking
    #[error("Session {0} is at capacity")]
    CapacityExceeded(SessionId),

    /// Occupancy bookkeeping is inconsistent
    #[error("Occupancy invariant violated: {0}")]
    InvalidState(String),

    /// The session was closed and takes no further bookings
    #[error("Session {0} is closed")]
    SessionClosed(SessionId),

    /// The class is already running; late seats are not handed to newcomers
    #[error("Session {0} has already started")]
    SessionStarted(SessionId),

    /// The waitlist has reached its configured length
    #[error("Waitlist for session {session_id} is full ({limit} entries)")]
    WaitlistFull {
        /// Target session
        session_id: SessionId,
        /// Configured maximum waitlist length
        limit: u32,
    },

    /// Session schedule facts failed validation
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// The backing store failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BookingError {
    /// Whether the error is an expected condition to surface to the user
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_)
                | Self::BookingNotFound(_)
                | Self::DuplicateBooking { .. }
                | Self::InvalidTransition { .. }
                | Self::SessionClosed(_)
                | Self::SessionStarted(_)
                | Self::WaitlistFull { .. }
                | Self::InvalidSession(_)
        )
    }

    /// Whether the error indicates a data-consistency bug that needs alerting
    #[must_use]
    pub const fn is_defect(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

/// Result alias for booking operations
pub type Result<T> = std::result::Result<T, BookingError>;
