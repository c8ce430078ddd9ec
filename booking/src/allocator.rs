//! Capacity allocator for a single class session.
//!
//! Decides whether a booking request gets a seat or a waitlist slot, applies
//! staff and member status changes, and hands freed seats to the head of the
//! waitlist.
//!
//! The reducer works on a [`SessionState`] that the booking service loads
//! fresh while holding the session's lock. Commands are validated, turned into
//! events and applied. Every applied event is appended to
//! [`SessionState::journal`] so the service knows which rows to write and
//! which metrics to record. A failed command leaves its error in
//! [`SessionState::last_error`]; the service then throws the state away, so a
//! partially applied command is never persisted.

use crate::config::BookingConfig;
use crate::error::BookingError;
use crate::ledger::{Booking, BookingLedger};
use crate::registry::ClassSession;
use crate::transitions::{self, SeatChange, Transition};
use crate::types::{BookingId, BookingStatus, MemberId};
use chrono::{DateTime, Utc};
use class_booking_core::{
    effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec,
};
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// A session together with its bookings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    /// The session row, including the occupancy counter
    pub session: ClassSession,
    /// Every booking made against the session
    pub ledger: BookingLedger,
    /// Events applied since the state was loaded
    pub journal: Vec<BookingAction>,
    /// Error of the last rejected command
    pub last_error: Option<BookingError>,
}

impl SessionState {
    /// Wraps loaded rows
    #[must_use]
    pub fn new(session: ClassSession, ledger: BookingLedger) -> Self {
        Self {
            session,
            ledger,
            journal: Vec::new(),
            last_error: None,
        }
    }

    /// Drains the events applied so far
    pub fn take_journal(&mut self) -> Vec<BookingAction> {
        std::mem::take(&mut self.journal)
    }

    /// Checks the occupancy counter against the ledger.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidState`] if `current_bookings` differs from the
    /// number of seat-holding bookings or exceeds capacity.
    pub fn check_occupancy(&self) -> Result<(), BookingError> {
        let counter = self.session.current_bookings();
        let seated = self.ledger.seated_count();
        let capacity = self.session.capacity().value();

        if counter != seated {
            return Err(BookingError::InvalidState(format!(
                "session {} counts {counter} occupied seats but has {seated} seated bookings",
                self.session.id()
            )));
        }
        if counter > capacity {
            return Err(BookingError::InvalidState(format!(
                "session {} holds {counter} seats over capacity {capacity}",
                self.session.id()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the capacity allocator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingAction {
    // Commands
    /// A member asks for a seat
    RequestBooking {
        /// Identifier for the booking to create
        booking_id: BookingId,
        /// Requesting member
        member_id: MemberId,
        /// Arrival time; orders the waitlist
        requested_at: DateTime<Utc>,
    },

    /// Member or staff cancels a booking
    CancelBooking {
        /// Booking to cancel
        booking_id: BookingId,
    },

    /// Staff checks a member in
    CheckIn {
        /// Booking to check in
        booking_id: BookingId,
    },

    /// Staff records that a member did not show up
    MarkNoShow {
        /// Booking to mark
        booking_id: BookingId,
    },

    /// Hand a free seat to the head of the waitlist
    PromoteWaitlist,

    /// Take the session off the schedule
    CloseSession,

    // Events
    /// A booking got a seat
    BookingConfirmed {
        /// The new booking
        booking: Booking,
    },

    /// A booking joined the waitlist
    BookingWaitlisted {
        /// The new booking
        booking: Booking,
    },

    /// A booking was cancelled
    BookingCancelled {
        /// Cancelled booking
        booking_id: BookingId,
        /// Whether the booking held a seat
        released_seat: bool,
        /// When cancelled
        cancelled_at: DateTime<Utc>,
    },

    /// A waitlisted booking took a freed seat
    WaitlistPromoted {
        /// Promoted booking
        booking_id: BookingId,
        /// When promoted
        promoted_at: DateTime<Utc>,
    },

    /// A member was checked in
    BookingCheckedIn {
        /// Checked-in booking
        booking_id: BookingId,
        /// When checked in
        checked_in_at: DateTime<Utc>,
    },

    /// A member was marked as no-show
    BookingMarkedNoShow {
        /// Marked booking
        booking_id: BookingId,
        /// When marked
        marked_at: DateTime<Utc>,
    },

    /// The session stopped taking bookings
    SessionClosed {
        /// When closed
        closed_at: DateTime<Utc>,
    },

    /// A command was rejected
    BookingRejected {
        /// Why
        error: BookingError,
    },
}

impl BookingAction {
    /// Whether this is a command
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::RequestBooking { .. }
                | Self::CancelBooking { .. }
                | Self::CheckIn { .. }
                | Self::MarkNoShow { .. }
                | Self::PromoteWaitlist
                | Self::CloseSession
        )
    }

    /// Whether this is an event
    #[must_use]
    pub const fn is_event(&self) -> bool {
        !self.is_command()
    }

    /// The booking this action is about, if any
    #[must_use]
    pub const fn booking_id(&self) -> Option<BookingId> {
        match self {
            Self::RequestBooking { booking_id, .. }
            | Self::CancelBooking { booking_id }
            | Self::CheckIn { booking_id }
            | Self::MarkNoShow { booking_id }
            | Self::BookingCancelled { booking_id, .. }
            | Self::WaitlistPromoted { booking_id, .. }
            | Self::BookingCheckedIn { booking_id, .. }
            | Self::BookingMarkedNoShow { booking_id, .. } => Some(*booking_id),
            Self::BookingConfirmed { booking } | Self::BookingWaitlisted { booking } => {
                Some(booking.id)
            }
            Self::PromoteWaitlist
            | Self::CloseSession
            | Self::SessionClosed { .. }
            | Self::BookingRejected { .. } => None,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the capacity allocator
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Clock for timestamps and the session-start check
    pub clock: Arc<dyn Clock>,
    /// Booking rules
    pub config: BookingConfig,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, config: BookingConfig) -> Self {
        Self { clock, config }
    }
}

// ============================================================================
// Reducer
// ============================================================================

type Effects = SmallVec<[Effect<BookingAction>; 4]>;

/// Reducer that guards the capacity of one session
///
/// Occupancy only moves inside [`CapacityAllocator::apply_event`], and only
/// together with the booking status change that justifies it.
#[derive(Clone, Copy, Debug, Default)]
pub struct CapacityAllocator;

impl CapacityAllocator {
    /// Creates a new `CapacityAllocator`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records a rejected command
    fn reject(state: &mut SessionState, error: BookingError) -> Effects {
        if error.is_defect() {
            tracing::error!(
                session_id = %state.session.id(),
                error = %error,
                "Occupancy invariant violated"
            );
        } else {
            tracing::debug!(session_id = %state.session.id(), error = %error, "Command rejected");
        }
        Self::apply(state, BookingAction::BookingRejected { error });
        SmallVec::new()
    }

    /// Applies an event, journaling it on success or rejecting on failure
    fn apply(state: &mut SessionState, event: BookingAction) -> bool {
        match Self::apply_event(state, &event) {
            Ok(()) => {
                if !matches!(event, BookingAction::BookingRejected { .. }) {
                    state.journal.push(event);
                }
                true
            }
            Err(error) => {
                // InvalidState is the only failure an event can produce
                // once its command validated.
                tracing::error!(
                    session_id = %state.session.id(),
                    error = %error,
                    "Failed to apply booking event"
                );
                state.last_error = Some(error);
                false
            }
        }
    }

    fn lookup<'a>(
        state: &'a SessionState,
        booking_id: &BookingId,
    ) -> Result<&'a Booking, BookingError> {
        state
            .ledger
            .get(booking_id)
            .ok_or(BookingError::BookingNotFound(*booking_id))
    }

    fn set_status(
        state: &mut SessionState,
        booking_id: &BookingId,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let booking = state
            .ledger
            .get_mut(booking_id)
            .ok_or(BookingError::BookingNotFound(*booking_id))?;
        booking.status = status;
        booking.updated_at = at;
        Ok(())
    }

    /// Applies an event to state
    ///
    /// Seat changes happen before the booking row is touched, so a failed
    /// seat change leaves the ledger as it was.
    fn apply_event(state: &mut SessionState, action: &BookingAction) -> Result<(), BookingError> {
        match action {
            BookingAction::BookingConfirmed { booking } => {
                state.session.increment_occupancy()?;
                state.ledger.insert(booking.clone());
                state.last_error = None;
            }

            BookingAction::BookingWaitlisted { booking } => {
                state.ledger.insert(booking.clone());
                state.last_error = None;
            }

            BookingAction::BookingCancelled {
                booking_id,
                released_seat,
                cancelled_at,
            } => {
                if *released_seat {
                    state.session.decrement_occupancy()?;
                }
                Self::set_status(state, booking_id, BookingStatus::Cancelled, *cancelled_at)?;
                state.last_error = None;
            }

            BookingAction::WaitlistPromoted {
                booking_id,
                promoted_at,
            } => {
                state.session.increment_occupancy()?;
                Self::set_status(state, booking_id, BookingStatus::Confirmed, *promoted_at)?;
                state.last_error = None;
            }

            BookingAction::BookingCheckedIn {
                booking_id,
                checked_in_at,
            } => {
                Self::set_status(state, booking_id, BookingStatus::Attended, *checked_in_at)?;
                state.last_error = None;
            }

            BookingAction::BookingMarkedNoShow {
                booking_id,
                marked_at,
            } => {
                Self::set_status(state, booking_id, BookingStatus::NoShow, *marked_at)?;
                state.last_error = None;
            }

            BookingAction::SessionClosed { .. } => {
                state.session.close();
                state.last_error = None;
            }

            BookingAction::BookingRejected { error } => {
                state.last_error = Some(error.clone());
            }

            // Commands don't modify state
            BookingAction::RequestBooking { .. }
            | BookingAction::CancelBooking { .. }
            | BookingAction::CheckIn { .. }
            | BookingAction::MarkNoShow { .. }
            | BookingAction::PromoteWaitlist
            | BookingAction::CloseSession => {}
        }
        Ok(())
    }

    fn request_booking(
        state: &mut SessionState,
        booking_id: BookingId,
        member_id: MemberId,
        requested_at: DateTime<Utc>,
        env: &BookingEnvironment,
    ) -> Effects {
        let session_id = state.session.id();

        if !state.session.is_open() {
            return Self::reject(state, BookingError::SessionClosed(session_id));
        }

        if state.session.has_started(requested_at) {
            return Self::reject(state, BookingError::SessionStarted(session_id));
        }

        if let Some(existing) = state.ledger.active_for_member(&member_id) {
            let existing = existing.id;
            return Self::reject(
                state,
                BookingError::DuplicateBooking {
                    member_id,
                    session_id,
                    existing,
                },
            );
        }

        let seated = transitions::admit(true);
        let confirmed = BookingAction::BookingConfirmed {
            booking: Booking::new(booking_id, session_id, member_id, seated.to, requested_at),
        };

        match Self::apply_event(state, &confirmed) {
            Ok(()) => {
                tracing::debug!(%session_id, %booking_id, %member_id, "Seat confirmed");
                state.journal.push(confirmed);
                return SmallVec::new();
            }
            Err(BookingError::CapacityExceeded(_)) => {}
            Err(error) => return Self::reject(state, error),
        }

        if env.config.waitlist_is_full(state.ledger.waitlist_len()) {
            return Self::reject(
                state,
                BookingError::WaitlistFull {
                    session_id,
                    limit: env.config.max_waitlist,
                },
            );
        }

        let waiting = transitions::admit(false);
        let booking = Booking::new(booking_id, session_id, member_id, waiting.to, requested_at);
        if Self::apply(state, BookingAction::BookingWaitlisted { booking }) {
            tracing::debug!(
                %session_id,
                %booking_id,
                %member_id,
                position = state.ledger.waitlist_len(),
                "Session full, booking waitlisted"
            );
        }
        SmallVec::new()
    }

    fn cancel_booking(
        state: &mut SessionState,
        booking_id: BookingId,
        env: &BookingEnvironment,
    ) -> Effects {
        let step = match Self::lookup(state, &booking_id)
            .and_then(|booking| transitions::advance(booking, Transition::Cancel))
        {
            Ok(step) => step,
            Err(error) => return Self::reject(state, error),
        };

        let now = env.clock.now();
        let released_seat = step.seat == SeatChange::Release;
        let event = BookingAction::BookingCancelled {
            booking_id,
            released_seat,
            cancelled_at: now,
        };
        if !Self::apply(state, event) {
            return SmallVec::new();
        }

        tracing::debug!(
            session_id = %state.session.id(),
            %booking_id,
            released_seat,
            "Booking cancelled"
        );

        // Seats freed once the class is running stay free.
        if released_seat && state.session.is_open() && !state.session.has_started(now) {
            smallvec![Effect::send(BookingAction::PromoteWaitlist)]
        } else {
            SmallVec::new()
        }
    }

    fn promote_waitlist(state: &mut SessionState, env: &BookingEnvironment) -> Effects {
        if !state.session.has_seat() {
            tracing::debug!(session_id = %state.session.id(), "No free seat to promote into");
            return SmallVec::new();
        }

        let Some(next) = state.ledger.next_in_waitlist() else {
            tracing::debug!(session_id = %state.session.id(), "Waitlist empty, seat stays free");
            return SmallVec::new();
        };

        let booking_id = next.id;
        if let Err(error) = transitions::advance(next, Transition::Promote) {
            return Self::reject(state, error);
        }

        let event = BookingAction::WaitlistPromoted {
            booking_id,
            promoted_at: env.clock.now(),
        };
        if Self::apply(state, event) {
            tracing::debug!(session_id = %state.session.id(), %booking_id, "Waitlist promoted");
        }
        SmallVec::new()
    }

    fn check_in(
        state: &mut SessionState,
        booking_id: BookingId,
        env: &BookingEnvironment,
    ) -> Effects {
        if let Err(error) = Self::lookup(state, &booking_id)
            .and_then(|booking| transitions::advance(booking, Transition::CheckIn))
        {
            return Self::reject(state, error);
        }

        let event = BookingAction::BookingCheckedIn {
            booking_id,
            checked_in_at: env.clock.now(),
        };
        if Self::apply(state, event) {
            tracing::debug!(session_id = %state.session.id(), %booking_id, "Member checked in");
        }
        SmallVec::new()
    }

    fn mark_no_show(
        state: &mut SessionState,
        booking_id: BookingId,
        env: &BookingEnvironment,
    ) -> Effects {
        let from = match Self::lookup(state, &booking_id)
            .and_then(|booking| {
                transitions::advance(booking, Transition::MarkNoShow).map(|_| booking.status)
            })
        {
            Ok(from) => from,
            Err(error) => return Self::reject(state, error),
        };

        let now = env.clock.now();
        if env.config.enforce_no_show_after_start && !state.session.has_started(now) {
            return Self::reject(
                state,
                BookingError::InvalidTransition {
                    booking_id,
                    from,
                    attempted: Transition::MarkNoShow,
                },
            );
        }

        let event = BookingAction::BookingMarkedNoShow {
            booking_id,
            marked_at: now,
        };
        if Self::apply(state, event) {
            tracing::debug!(
                session_id = %state.session.id(),
                %booking_id,
                "Member marked as no-show"
            );
        }
        SmallVec::new()
    }

    fn close_session(state: &mut SessionState, env: &BookingEnvironment) -> Effects {
        if !state.session.is_open() {
            let session_id = state.session.id();
            return Self::reject(state, BookingError::SessionClosed(session_id));
        }

        let now = env.clock.now();
        let mut open: Vec<(BookingId, BookingStatus)> = state
            .ledger
            .iter()
            .filter(|b| matches!(b.status, BookingStatus::Confirmed | BookingStatus::Waitlisted))
            .map(|b| (b.id, b.status))
            .collect();
        open.sort_by_key(|(id, _)| state.ledger.get(id).map(Booking::queue_key));

        for (booking_id, status) in open {
            let event = BookingAction::BookingCancelled {
                booking_id,
                released_seat: status.holds_seat(),
                cancelled_at: now,
            };
            if !Self::apply(state, event) {
                return SmallVec::new();
            }
        }

        if Self::apply(state, BookingAction::SessionClosed { closed_at: now }) {
            tracing::debug!(session_id = %state.session.id(), "Session closed");
        }
        SmallVec::new()
    }
}

impl Reducer for CapacityAllocator {
    type State = SessionState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if action.is_event() {
            // Replay: the event already happened, just fold it in.
            Self::apply(state, action);
            return SmallVec::new();
        }

        if let Err(error) = state.check_occupancy() {
            return Self::reject(state, error);
        }

        match action {
            BookingAction::RequestBooking {
                booking_id,
                member_id,
                requested_at,
            } => Self::request_booking(state, booking_id, member_id, requested_at, env),
            BookingAction::CancelBooking { booking_id } => {
                Self::cancel_booking(state, booking_id, env)
            }
            BookingAction::CheckIn { booking_id } => Self::check_in(state, booking_id, env),
            BookingAction::MarkNoShow { booking_id } => Self::mark_no_show(state, booking_id, env),
            BookingAction::PromoteWaitlist => Self::promote_waitlist(state, env),
            BookingAction::CloseSession => Self::close_session(state, env),
            _ => SmallVec::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::NewSession;
    use crate::types::SessionId;
    use chrono::Duration;
    use class_booking_testing::{assertions, test_clock, test_epoch, FixedClock, ReducerTest};

    fn session(capacity: u32) -> ClassSession {
        ClassSession::schedule(
            SessionId::new(),
            NewSession {
                title: "HIIT".to_string(),
                trainer: "Jo".to_string(),
                location: "Main floor".to_string(),
                start_time: test_epoch() + Duration::hours(2),
                end_time: test_epoch() + Duration::hours(3),
                capacity,
            },
            test_epoch(),
        )
        .unwrap()
    }

    fn state(capacity: u32) -> SessionState {
        SessionState::new(session(capacity), BookingLedger::new())
    }

    fn env() -> BookingEnvironment {
        BookingEnvironment::new(Arc::new(test_clock()), BookingConfig::default())
    }

    fn env_at(now: DateTime<Utc>) -> BookingEnvironment {
        BookingEnvironment::new(Arc::new(FixedClock::new(now)), BookingConfig::default())
    }

    fn request(booking_id: BookingId, offset_secs: i64) -> BookingAction {
        BookingAction::RequestBooking {
            booking_id,
            member_id: MemberId::new(),
            requested_at: test_epoch() + Duration::seconds(offset_secs),
        }
    }

    fn status_of(state: &SessionState, id: BookingId) -> Option<BookingStatus> {
        state.ledger.get(&id).map(|b| b.status)
    }

    #[test]
    fn request_with_free_seat_is_confirmed() {
        let id = BookingId::new();

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(2))
            .when_action(request(id, 0))
            .then_state(move |s| {
                assert_eq!(status_of(s, id), Some(BookingStatus::Confirmed));
                assert_eq!(s.session.current_bookings(), 1);
                assert!(s.last_error.is_none());
                assert_eq!(s.journal.len(), 1);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn request_on_full_session_is_waitlisted() {
        let (a, b, c) = (BookingId::new(), BookingId::new(), BookingId::new());

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(2))
            .given_action(request(a, 0))
            .given_action(request(b, 1))
            .when_action(request(c, 2))
            .then_state(move |s| {
                assert_eq!(status_of(s, c), Some(BookingStatus::Waitlisted));
                assert_eq!(s.session.current_bookings(), 2);
                assert_eq!(s.ledger.waitlist_position(&c), Some(1));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn duplicate_request_is_rejected() {
        let first = BookingId::new();
        let member_id = MemberId::new();
        let again = BookingAction::RequestBooking {
            booking_id: BookingId::new(),
            member_id,
            requested_at: test_epoch(),
        };

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(5))
            .given_action(BookingAction::RequestBooking {
                booking_id: first,
                member_id,
                requested_at: test_epoch(),
            })
            .when_action(again)
            .then_state(move |s| {
                assert!(matches!(
                    s.last_error,
                    Some(BookingError::DuplicateBooking { existing, .. }) if existing == first
                ));
                assert_eq!(s.ledger.len(), 1);
                assert_eq!(s.session.current_bookings(), 1);
            })
            .run();
    }

    #[test]
    fn waitlist_limit_is_enforced() {
        let env = BookingEnvironment::new(
            Arc::new(test_clock()),
            BookingConfig {
                max_waitlist: 1,
                ..BookingConfig::default()
            },
        );

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env)
            .given_state(state(1))
            .given_action(request(BookingId::new(), 0))
            .given_action(request(BookingId::new(), 1))
            .when_action(request(BookingId::new(), 2))
            .then_state(|s| {
                assert!(matches!(
                    s.last_error,
                    Some(BookingError::WaitlistFull { limit: 1, .. })
                ));
                assert_eq!(s.ledger.waitlist_len(), 1);
            })
            .run();
    }

    #[test]
    fn cancelling_confirmed_before_start_requests_promotion() {
        let seated = BookingId::new();

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(1))
            .given_action(request(seated, 0))
            .when_action(BookingAction::CancelBooking { booking_id: seated })
            .then_state(move |s| {
                assert_eq!(status_of(s, seated), Some(BookingStatus::Cancelled));
                assert_eq!(s.session.current_bookings(), 0);
            })
            .then_effects(|effects| {
                assertions::assert_sends(effects, |a| *a == BookingAction::PromoteWaitlist);
            })
            .run();
    }

    #[test]
    fn cancelling_after_start_does_not_promote() {
        let seated = BookingId::new();
        let waiting = BookingId::new();
        let during_class = test_epoch() + Duration::hours(2) + Duration::minutes(10);

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env_at(during_class))
            .given_state(state(1))
            .given_action(request(seated, 0))
            .given_action(request(waiting, 1))
            .when_action(BookingAction::CancelBooking { booking_id: seated })
            .then_state(move |s| {
                assert_eq!(s.session.current_bookings(), 0);
                assert_eq!(status_of(s, waiting), Some(BookingStatus::Waitlisted));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn cancelling_waitlisted_keeps_occupancy() {
        let seated = BookingId::new();
        let waiting = BookingId::new();

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(1))
            .given_action(request(seated, 0))
            .given_action(request(waiting, 1))
            .when_action(BookingAction::CancelBooking { booking_id: waiting })
            .then_state(move |s| {
                assert_eq!(status_of(s, waiting), Some(BookingStatus::Cancelled));
                assert_eq!(s.session.current_bookings(), 1);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn promotion_takes_earliest_request() {
        let seated = BookingId::new();
        let late = BookingId::new();
        let early = BookingId::new();

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(1))
            .given_action(request(seated, 0))
            .given_action(request(late, 20))
            .given_action(request(early, 10))
            .given_action(BookingAction::CancelBooking { booking_id: seated })
            .when_action(BookingAction::PromoteWaitlist)
            .then_state(move |s| {
                assert_eq!(status_of(s, early), Some(BookingStatus::Confirmed));
                assert_eq!(status_of(s, late), Some(BookingStatus::Waitlisted));
                assert_eq!(s.session.current_bookings(), 1);
                assert!(s.check_occupancy().is_ok());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn promotion_with_empty_waitlist_leaves_seat_free() {
        let seated = BookingId::new();

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(1))
            .given_action(request(seated, 0))
            .given_action(BookingAction::CancelBooking { booking_id: seated })
            .when_action(BookingAction::PromoteWaitlist)
            .then_state(|s| {
                assert_eq!(s.session.current_bookings(), 0);
                assert!(s.last_error.is_none());
            })
            .run();
    }

    #[test]
    fn check_in_waitlisted_is_invalid_transition() {
        let seated = BookingId::new();
        let waiting = BookingId::new();

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(1))
            .given_action(request(seated, 0))
            .given_action(request(waiting, 1))
            .when_action(BookingAction::CheckIn { booking_id: waiting })
            .then_state(move |s| {
                assert_eq!(
                    s.last_error,
                    Some(BookingError::InvalidTransition {
                        booking_id: waiting,
                        from: BookingStatus::Waitlisted,
                        attempted: Transition::CheckIn,
                    })
                );
                assert_eq!(status_of(s, waiting), Some(BookingStatus::Waitlisted));
            })
            .run();
    }

    #[test]
    fn check_in_keeps_seat() {
        let seated = BookingId::new();

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(3))
            .given_action(request(seated, 0))
            .when_action(BookingAction::CheckIn { booking_id: seated })
            .then_state(move |s| {
                assert_eq!(status_of(s, seated), Some(BookingStatus::Attended));
                assert_eq!(s.session.current_bookings(), 1);
            })
            .run();
    }

    #[test]
    fn no_show_before_start_is_rejected() {
        let seated = BookingId::new();

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(3))
            .given_action(request(seated, 0))
            .when_action(BookingAction::MarkNoShow { booking_id: seated })
            .then_state(move |s| {
                assert!(matches!(
                    s.last_error,
                    Some(BookingError::InvalidTransition {
                        attempted: Transition::MarkNoShow,
                        ..
                    })
                ));
                assert_eq!(status_of(s, seated), Some(BookingStatus::Confirmed));
            })
            .run();
    }

    #[test]
    fn no_show_after_start_keeps_seat() {
        let seated = BookingId::new();
        let after_start = test_epoch() + Duration::hours(2);

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env_at(after_start))
            .given_state(state(3))
            .given_action(request(seated, 0))
            .when_action(BookingAction::MarkNoShow { booking_id: seated })
            .then_state(move |s| {
                assert_eq!(status_of(s, seated), Some(BookingStatus::NoShow));
                assert_eq!(s.session.current_bookings(), 1);
                assert!(s.last_error.is_none());
                assert!(s.check_occupancy().is_ok());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn session_keeps_working_after_no_show() {
        let absent = BookingId::new();
        let present = BookingId::new();
        let after_start = test_epoch() + Duration::hours(2);

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env_at(after_start))
            .given_state(state(3))
            .given_action(request(absent, 0))
            .given_action(request(present, 1))
            .given_action(BookingAction::MarkNoShow { booking_id: absent })
            .when_action(BookingAction::CheckIn { booking_id: present })
            .then_state(move |s| {
                assert!(s.last_error.is_none());
                assert_eq!(status_of(s, absent), Some(BookingStatus::NoShow));
                assert_eq!(status_of(s, present), Some(BookingStatus::Attended));
                assert_eq!(s.session.current_bookings(), 2);
                assert!(s.check_occupancy().is_ok());
            })
            .run();
    }

    #[test]
    fn request_after_start_is_rejected() {
        let seated = BookingId::new();
        let waiting = BookingId::new();
        let late = BookingId::new();
        let during_class = test_epoch() + Duration::hours(2) + Duration::minutes(10);

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env_at(during_class))
            .given_state(state(1))
            .given_action(request(seated, 0))
            .given_action(request(waiting, 1))
            .given_action(BookingAction::CancelBooking { booking_id: seated })
            .when_action(BookingAction::RequestBooking {
                booking_id: late,
                member_id: MemberId::new(),
                requested_at: during_class,
            })
            .then_state(move |s| {
                assert!(matches!(s.last_error, Some(BookingError::SessionStarted(_))));
                assert_eq!(status_of(s, late), None);
                assert_eq!(status_of(s, waiting), Some(BookingStatus::Waitlisted));
                assert_eq!(s.session.current_bookings(), 0);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn close_cancels_open_bookings_without_promotion() {
        let seated = BookingId::new();
        let attended = BookingId::new();
        let waiting = BookingId::new();

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(2))
            .given_action(request(seated, 0))
            .given_action(request(attended, 1))
            .given_action(request(waiting, 2))
            .given_action(BookingAction::CheckIn { booking_id: attended })
            .when_action(BookingAction::CloseSession)
            .then_state(move |s| {
                assert!(!s.session.is_open());
                assert_eq!(status_of(s, seated), Some(BookingStatus::Cancelled));
                assert_eq!(status_of(s, waiting), Some(BookingStatus::Cancelled));
                assert_eq!(status_of(s, attended), Some(BookingStatus::Attended));
                assert_eq!(s.session.current_bookings(), 1);
                assert!(s.check_occupancy().is_ok());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn closed_session_rejects_requests() {
        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(2))
            .given_action(BookingAction::CloseSession)
            .when_action(request(BookingId::new(), 0))
            .then_state(|s| {
                assert!(matches!(s.last_error, Some(BookingError::SessionClosed(_))));
                assert!(s.ledger.is_empty());
            })
            .run();
    }

    #[test]
    fn corrupted_counter_is_invalid_state() {
        let mut broken = state(2);
        broken.ledger.insert(Booking::new(
            BookingId::new(),
            broken.session.id(),
            MemberId::new(),
            BookingStatus::Confirmed,
            test_epoch(),
        ));

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(broken)
            .when_action(request(BookingId::new(), 0))
            .then_state(|s| {
                assert!(matches!(s.last_error, Some(BookingError::InvalidState(_))));
                assert!(s.journal.is_empty());
            })
            .run();
    }

    #[test]
    fn unknown_booking_is_not_found() {
        let missing = BookingId::new();

        ReducerTest::new(CapacityAllocator::new())
            .with_env(env())
            .given_state(state(2))
            .when_action(BookingAction::CancelBooking { booking_id: missing })
            .then_state(move |s| {
                assert_eq!(s.last_error, Some(BookingError::BookingNotFound(missing)));
            })
            .run();
    }

    #[test]
    fn action_classification() {
        assert!(BookingAction::PromoteWaitlist.is_command());
        assert!(BookingAction::SessionClosed { closed_at: test_epoch() }.is_event());
        let id = BookingId::new();
        assert_eq!(BookingAction::CheckIn { booking_id: id }.booking_id(), Some(id));
        assert_eq!(BookingAction::CloseSession.booking_id(), None);
    }
}
