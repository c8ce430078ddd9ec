//! Booking ledger: every booking made against one session.
//!
//! Records are never removed. Cancellation and the other terminal outcomes
//! are status changes, so the ledger doubles as attendance history.

use crate::types::{BookingId, BookingStatus, MemberId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A member's claim on one seat of a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier
    pub id: BookingId,
    /// Owning session
    pub session_id: SessionId,
    /// Requesting member
    pub member_id: MemberId,
    /// Current status
    pub status: BookingStatus,
    /// When the request arrived; orders the waitlist
    pub requested_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a booking record
    #[must_use]
    pub const fn new(
        id: BookingId,
        session_id: SessionId,
        member_id: MemberId,
        status: BookingStatus,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_id,
            member_id,
            status,
            requested_at,
            updated_at: requested_at,
        }
    }

    /// Waitlist ordering key: earliest request first, booking id breaks ties
    #[must_use]
    pub const fn queue_key(&self) -> (DateTime<Utc>, BookingId) {
        (self.requested_at, self.id)
    }
}

/// All bookings for a single session, keyed by id
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookingLedger {
    bookings: BTreeMap<BookingId, Booking>,
}

impl BookingLedger {
    /// Creates an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from stored rows
    pub fn from_bookings(bookings: impl IntoIterator<Item = Booking>) -> Self {
        Self {
            bookings: bookings.into_iter().map(|b| (b.id, b)).collect(),
        }
    }

    /// Looks up a booking
    #[must_use]
    pub fn get(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &BookingId) -> Option<&mut Booking> {
        self.bookings.get_mut(id)
    }

    pub(crate) fn insert(&mut self, booking: Booking) {
        self.bookings.insert(booking.id, booking);
    }

    /// Number of bookings ever recorded
    #[must_use]
    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    /// Whether no booking was ever recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// All bookings in id order
    pub fn iter(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.values()
    }

    /// Bookings with the given status
    pub fn with_status(&self, status: BookingStatus) -> impl Iterator<Item = &Booking> {
        self.bookings.values().filter(move |b| b.status == status)
    }

    /// The member's active booking, if any
    #[must_use]
    pub fn active_for_member(&self, member_id: &MemberId) -> Option<&Booking> {
        self.bookings
            .values()
            .find(|b| b.member_id == *member_id && b.status.is_active())
    }

    /// Bookings counted against capacity (confirmed, attended or no-show)
    #[must_use]
    pub fn seated_count(&self) -> u32 {
        let seated = self.bookings.values().filter(|b| b.status.holds_seat()).count();
        u32::try_from(seated).unwrap_or(u32::MAX)
    }

    /// Waitlisted bookings in promotion order
    #[must_use]
    pub fn waitlist(&self) -> Vec<&Booking> {
        let mut waiting: Vec<&Booking> = self.with_status(BookingStatus::Waitlisted).collect();
        waiting.sort_by_key(|b| b.queue_key());
        waiting
    }

    /// Length of the waitlist
    #[must_use]
    pub fn waitlist_len(&self) -> usize {
        self.with_status(BookingStatus::Waitlisted).count()
    }

    /// The waitlisted booking that gets the next free seat
    #[must_use]
    pub fn next_in_waitlist(&self) -> Option<&Booking> {
        self.with_status(BookingStatus::Waitlisted)
            .min_by_key(|b| b.queue_key())
    }

    /// 1-based waitlist position of a booking, `None` if it is not waitlisted
    #[must_use]
    pub fn waitlist_position(&self, id: &BookingId) -> Option<usize> {
        self.waitlist()
            .iter()
            .position(|b| b.id == *id)
            .map(|index| index + 1)
    }
}
