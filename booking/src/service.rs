//! Booking service: the entry point for member and staff operations.
//!
//! Every mutating call runs the same cycle for one session:
//!
//! 1. acquire the session's lock
//! 2. load the session and all of its bookings from the store
//! 3. drive the [`CapacityAllocator`], feeding `Effect::Send` actions back in
//! 4. commit every touched row in one [`BookingStore::commit`]
//! 5. release the lock
//!
//! If any action in step 3 fails, nothing is committed. Different sessions
//! never contend with each other.

use crate::allocator::{BookingAction, BookingEnvironment, CapacityAllocator, SessionState};
use crate::config::BookingConfig;
use crate::error::{BookingError, Result};
use crate::ledger::{Booking, BookingLedger};
use crate::metrics;
use crate::registry::{ClassSession, NewSession, SessionRegistry};
use crate::storage::{BookingFilter, BookingQuery, BookingStore, ChangeSet};
use crate::types::{
    BookingId, BookingReceipt, BookingStatus, CancellationReceipt, ClosureReceipt, MemberId,
    Occupancy, SessionId, StatusReceipt,
};
use class_booking_core::effect::Effect;
use class_booking_core::environment::Clock;
use class_booking_core::reducer::Reducer;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;

/// Lock table keyed by session
///
/// Entries exist only while some call holds or waits for the session's lock.
#[derive(Debug, Default)]
struct SessionLocks {
    table: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: SessionId) -> SessionGuard<'_> {
        let lock = {
            // The table only maps ids to mutexes; a panic elsewhere cannot
            // leave it half-written.
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(session_id).or_default())
        };
        SessionGuard {
            locks: self,
            session_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Drops the session's entry once nobody holds or awaits it.
    ///
    /// Clones of the entry are only taken under the table lock, so a strong
    /// count of one means the table is the last owner.
    fn prune(&self, session_id: SessionId) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table
            .get(&session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&session_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Holds a session's lock; releasing it prunes the lock table
struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    session_id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune(self.session_id);
    }
}

/// Member and staff operations on class sessions
///
/// Cheap to clone; clones share the store and the lock table.
///
/// # Example
///
/// ```
/// use class_booking::{BookingService, BookingStatus, InMemoryBookingStore, NewSession};
/// use class_booking::config::BookingConfig;
/// use class_booking::types::MemberId;
/// use class_booking_core::environment::SystemClock;
/// use chrono::{Duration, Utc};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = BookingService::new(
///     Arc::new(InMemoryBookingStore::new()),
///     Arc::new(SystemClock),
///     BookingConfig::default(),
/// );
///
/// let session = service
///     .schedule_session(NewSession {
///         title: "Spin".to_string(),
///         trainer: "Alex".to_string(),
///         location: "Studio 2".to_string(),
///         start_time: Utc::now() + Duration::days(1),
///         end_time: Utc::now() + Duration::days(1) + Duration::hours(1),
///         capacity: 1,
///     })
///     .await?;
///
/// let receipt = service.request_booking(session.id(), MemberId::new()).await?;
/// assert_eq!(receipt.status, BookingStatus::Confirmed);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    registry: SessionRegistry,
    reducer: CapacityAllocator,
    env: BookingEnvironment,
    locks: Arc<SessionLocks>,
}

impl BookingService {
    /// Creates a service over `store`
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, config: BookingConfig) -> Self {
        Self {
            registry: SessionRegistry::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            reducer: CapacityAllocator::new(),
            env: BookingEnvironment::new(clock, config),
            locks: Arc::new(SessionLocks::default()),
        }
    }

    /// Publishes a new session.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidSession`] for a zero capacity or an end time not
    /// after the start time.
    #[tracing::instrument(
        skip(self, new_session),
        fields(title = %new_session.title, capacity = new_session.capacity)
    )]
    pub async fn schedule_session(&self, new_session: NewSession) -> Result<ClassSession> {
        self.registry.schedule(new_session).await
    }

    /// Loads a session.
    ///
    /// # Errors
    ///
    /// [`BookingError::SessionNotFound`] for an unknown id.
    pub async fn get_session(&self, session_id: SessionId) -> Result<ClassSession> {
        self.registry.get_session(session_id).await
    }

    /// Loads a booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingNotFound`] for an unknown id.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))
    }

    /// Books a seat, or a waitlist slot when the session is full.
    ///
    /// # Errors
    ///
    /// - [`BookingError::SessionNotFound`] for an unknown session
    /// - [`BookingError::DuplicateBooking`] if the member already holds an
    ///   active booking for the session
    /// - [`BookingError::SessionClosed`] if the session was closed
    /// - [`BookingError::WaitlistFull`] if the session is full and the
    ///   waitlist reached its configured length
    #[tracing::instrument(skip(self))]
    pub async fn request_booking(
        &self,
        session_id: SessionId,
        member_id: MemberId,
    ) -> Result<BookingReceipt> {
        let booking_id = BookingId::new();
        let action = BookingAction::RequestBooking {
            booking_id,
            member_id,
            requested_at: self.env.clock.now(),
        };

        let state = self.run("request_booking", session_id, action).await?;
        let status = Self::status_in(&state, booking_id)?;

        tracing::info!(%booking_id, %status, "Booking requested");
        Ok(BookingReceipt { booking_id, status })
    }

    /// Cancels a booking and, if it held a seat before the class started,
    /// promotes the head of the waitlist.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingNotFound`] for an unknown id,
    /// [`BookingError::InvalidTransition`] if the booking is not confirmed or
    /// waitlisted.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_booking(&self, booking_id: BookingId) -> Result<CancellationReceipt> {
        let session_id = self.get_booking(booking_id).await?.session_id;
        let state = self
            .run("cancel_booking", session_id, BookingAction::CancelBooking { booking_id })
            .await?;

        let promoted = state.journal.iter().find_map(|event| match event {
            BookingAction::WaitlistPromoted { booking_id: promoted, .. } => Some(*promoted),
            _ => None,
        });

        tracing::info!(%booking_id, ?promoted, "Booking cancelled");
        Ok(CancellationReceipt {
            booking_id,
            status: Self::status_in(&state, booking_id)?,
            promoted,
        })
    }

    /// Checks a confirmed member in.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingNotFound`] for an unknown id,
    /// [`BookingError::InvalidTransition`] unless the booking is confirmed.
    #[tracing::instrument(skip(self))]
    pub async fn check_in(&self, booking_id: BookingId) -> Result<StatusReceipt> {
        let session_id = self.get_booking(booking_id).await?.session_id;
        let state = self
            .run("check_in", session_id, BookingAction::CheckIn { booking_id })
            .await?;

        tracing::info!(%booking_id, "Member checked in");
        Ok(StatusReceipt {
            booking_id,
            status: Self::status_in(&state, booking_id)?,
        })
    }

    /// Records that a confirmed member did not show up. The seat stays taken.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingNotFound`] for an unknown id,
    /// [`BookingError::InvalidTransition`] unless the booking is confirmed, or
    /// if the session has not started yet and that is enforced.
    #[tracing::instrument(skip(self))]
    pub async fn mark_no_show(&self, booking_id: BookingId) -> Result<StatusReceipt> {
        let session_id = self.get_booking(booking_id).await?.session_id;
        let state = self
            .run("mark_no_show", session_id, BookingAction::MarkNoShow { booking_id })
            .await?;

        tracing::info!(%booking_id, "Member marked as no-show");
        Ok(StatusReceipt {
            booking_id,
            status: Self::status_in(&state, booking_id)?,
        })
    }

    /// Closes a session: open bookings are cancelled and no new ones accepted.
    ///
    /// # Errors
    ///
    /// [`BookingError::SessionNotFound`] for an unknown session,
    /// [`BookingError::SessionClosed`] if it is already closed.
    #[tracing::instrument(skip(self))]
    pub async fn close_session(&self, session_id: SessionId) -> Result<ClosureReceipt> {
        let state = self
            .run("close_session", session_id, BookingAction::CloseSession)
            .await?;

        let cancelled: Vec<BookingId> = state
            .journal
            .iter()
            .filter_map(|event| match event {
                BookingAction::BookingCancelled { booking_id, .. } => Some(*booking_id),
                _ => None,
            })
            .collect();

        tracing::info!(cancelled = cancelled.len(), "Session closed");
        Ok(ClosureReceipt {
            session_id,
            cancelled,
        })
    }

    /// Current occupancy of a session.
    ///
    /// # Errors
    ///
    /// [`BookingError::SessionNotFound`] for an unknown session.
    pub async fn session_occupancy(&self, session_id: SessionId) -> Result<Occupancy> {
        self.registry.occupancy(session_id).await
    }

    /// Lists the bookings of a session or a member, ordered by request time.
    ///
    /// # Errors
    ///
    /// [`BookingError::Storage`] if the store fails.
    pub async fn list_bookings(
        &self,
        filter: BookingFilter,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>> {
        Ok(self.store.query_by_index(BookingQuery { filter, status }).await?)
    }

    /// 1-based waitlist position, `None` if the booking is not waitlisted.
    ///
    /// # Errors
    ///
    /// [`BookingError::BookingNotFound`] for an unknown id.
    pub async fn waitlist_position(&self, booking_id: BookingId) -> Result<Option<usize>> {
        let booking = self.get_booking(booking_id).await?;
        if booking.status != BookingStatus::Waitlisted {
            return Ok(None);
        }

        let waitlist = self
            .store
            .query_by_index(BookingQuery::waitlist(booking.session_id))
            .await?;
        Ok(BookingLedger::from_bookings(waitlist).waitlist_position(&booking_id))
    }

    /// Runs one command against a session under its lock and commits the result.
    async fn run(
        &self,
        operation: &'static str,
        session_id: SessionId,
        action: BookingAction,
    ) -> Result<SessionState> {
        let started = Instant::now();
        let _guard = self.locks.acquire(session_id).await;

        let mut state = self.load(session_id).await?;
        let outcome = self.drive(&mut state, action);
        let result = match outcome {
            Ok(()) => self.persist(state).await,
            Err(error) => {
                if error.is_defect() {
                    metrics::record_invariant_violation();
                    tracing::error!(
                        %session_id,
                        operation,
                        error = %error,
                        "Rejected corrupted session state"
                    );
                }
                Err(error)
            }
        };

        metrics::record_operation_duration(operation, started.elapsed());
        result
    }

    async fn load(&self, session_id: SessionId) -> Result<SessionState> {
        let session = self.registry.get_session(session_id).await?;
        let bookings = self.store.query_by_index(BookingQuery::session(session_id)).await?;
        Ok(SessionState::new(session, BookingLedger::from_bookings(bookings)))
    }

    /// Reduces `action` and every action fed back through `Effect::Send`.
    fn drive(&self, state: &mut SessionState, action: BookingAction) -> Result<()> {
        let mut pending = VecDeque::from([action]);

        while let Some(action) = pending.pop_front() {
            let effects = self.reducer.reduce(state, action, &self.env);
            if let Some(error) = state.last_error.take() {
                return Err(error);
            }
            pending.extend(effects.into_iter().filter_map(Effect::into_action));
        }

        Ok(())
    }

    async fn persist(&self, state: SessionState) -> Result<SessionState> {
        let touched: BTreeSet<BookingId> = state
            .journal
            .iter()
            .filter_map(BookingAction::booking_id)
            .collect();
        let bookings = touched
            .iter()
            .filter_map(|id| state.ledger.get(id).cloned())
            .collect();

        self.store
            .commit(ChangeSet {
                session: state.session.clone(),
                bookings,
            })
            .await?;

        for event in &state.journal {
            metrics::record_event(event);
        }
        Ok(state)
    }

    fn status_in(state: &SessionState, booking_id: BookingId) -> Result<BookingStatus> {
        state
            .ledger
            .get(&booking_id)
            .map(|b| b.status)
            .ok_or(BookingError::BookingNotFound(booking_id))
    }
}
