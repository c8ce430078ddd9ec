//! Booking status state machine.
//!
//! Every status change a booking can go through after it was created is
//! listed in [`advance`]. Anything not listed is an illegal transition.
//!
//! ```text
//!              book (seat)            check_in
//!   (none) ─────────────────▶ confirmed ────────▶ attended
//!     │                        │  ▲   │
//!     │ book (full)     cancel │  │   │ mark_no_show
//!     ▼                        │  │   ▼
//!  waitlisted ── promote ──────┼──┘  no_show
//!     │                        ▼
//!     └──────── cancel ──▶ cancelled
//! ```

use crate::error::BookingError;
use crate::ledger::Booking;
use crate::types::BookingStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A status-changing event applied to an existing booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Staff checks the member in
    CheckIn,
    /// Member or staff cancels
    Cancel,
    /// Staff records a no-show
    MarkNoShow,
    /// A freed seat is handed to the head of the waitlist
    Promote,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CheckIn => "check in",
            Self::Cancel => "cancel",
            Self::MarkNoShow => "mark as no-show",
            Self::Promote => "promote",
        })
    }
}

/// What a transition does to the session's occupancy counter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeatChange {
    /// Occupancy is untouched
    Unchanged,
    /// Occupancy +1
    Claim,
    /// Occupancy −1
    Release,
}

/// The outcome of a legal transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    /// Status after the transition
    pub to: BookingStatus,
    /// Required occupancy side effect
    pub seat: SeatChange,
}

/// Status of a brand new booking, given whether it obtained a seat
#[must_use]
pub const fn admit(seat_claimed: bool) -> Step {
    if seat_claimed {
        Step {
            to: BookingStatus::Confirmed,
            seat: SeatChange::Claim,
        }
    } else {
        Step {
            to: BookingStatus::Waitlisted,
            seat: SeatChange::Unchanged,
        }
    }
}

/// Looks up the transition table for `booking`.
///
/// Pure: the booking is not modified.
///
/// # Errors
///
/// Returns [`BookingError::InvalidTransition`] for any pair not in the table.
pub fn advance(booking: &Booking, transition: Transition) -> Result<Step, BookingError> {
    use BookingStatus::{Attended, Cancelled, Confirmed, NoShow, Waitlisted};

    let step = match (booking.status, transition) {
        (Confirmed, Transition::CheckIn) => Step {
            to: Attended,
            seat: SeatChange::Unchanged,
        },
        (Confirmed, Transition::Cancel) => Step {
            to: Cancelled,
            seat: SeatChange::Release,
        },
        (Waitlisted, Transition::Cancel) => Step {
            to: Cancelled,
            seat: SeatChange::Unchanged,
        },
        (Confirmed, Transition::MarkNoShow) => Step {
            to: NoShow,
            seat: SeatChange::Unchanged,
        },
        (Waitlisted, Transition::Promote) => Step {
            to: Confirmed,
            seat: SeatChange::Claim,
        },
        (from, attempted) => {
            return Err(BookingError::InvalidTransition {
                booking_id: booking.id,
                from,
                attempted,
            });
        }
    };

    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookingId, MemberId, SessionId};
    use chrono::Utc;

    fn booking(status: BookingStatus) -> Booking {
        Booking::new(BookingId::new(), SessionId::new(), MemberId::new(), status, Utc::now())
    }

    #[test]
    fn admit_with_and_without_seat() {
        assert_eq!(admit(true).to, BookingStatus::Confirmed);
        assert_eq!(admit(true).seat, SeatChange::Claim);
        assert_eq!(admit(false).to, BookingStatus::Waitlisted);
        assert_eq!(admit(false).seat, SeatChange::Unchanged);
    }

    #[test]
    fn legal_transitions() {
        use BookingStatus::{Attended, Cancelled, Confirmed, NoShow, Waitlisted};

        let cases = [
            (Confirmed, Transition::CheckIn, Attended, SeatChange::Unchanged),
            (Confirmed, Transition::Cancel, Cancelled, SeatChange::Release),
            (Waitlisted, Transition::Cancel, Cancelled, SeatChange::Unchanged),
            (Confirmed, Transition::MarkNoShow, NoShow, SeatChange::Unchanged),
            (Waitlisted, Transition::Promote, Confirmed, SeatChange::Claim),
        ];

        for (from, transition, to, seat) in cases {
            let step = advance(&booking(from), transition);
            assert_eq!(step, Ok(Step { to, seat }), "{from} --{transition}-->");
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        for from in [BookingStatus::Cancelled, BookingStatus::Attended, BookingStatus::NoShow] {
            for transition in [
                Transition::CheckIn,
                Transition::Cancel,
                Transition::MarkNoShow,
                Transition::Promote,
            ] {
                assert!(
                    matches!(
                        advance(&booking(from), transition),
                        Err(BookingError::InvalidTransition { .. })
                    ),
                    "{from} must not {transition}"
                );
            }
        }
    }

    #[test]
    fn waitlisted_cannot_check_in() {
        let waiting = booking(BookingStatus::Waitlisted);
        let error = advance(&waiting, Transition::CheckIn);
        assert_eq!(
            error,
            Err(BookingError::InvalidTransition {
                booking_id: waiting.id,
                from: BookingStatus::Waitlisted,
                attempted: Transition::CheckIn,
            })
        );
    }
}
