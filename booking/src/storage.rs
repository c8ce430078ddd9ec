//! Storage abstraction for sessions and bookings.
//!
//! The allocator never touches storage. The booking service loads a session
//! and its bookings, reduces in memory, and writes the result back with one
//! [`BookingStore::commit`] call, so a store only has to make that single
//! call atomic.

use crate::error::BookingError;
use crate::ledger::Booking;
use crate::registry::ClassSession;
use crate::types::{BookingId, BookingStatus, MemberId, SessionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a storage backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend could not serve the request
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// A writer panicked while holding the tables
    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<StorageError> for BookingError {
    fn from(error: StorageError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Which bookings to list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookingFilter {
    /// All bookings of a session (admin table)
    Session(SessionId),
    /// All bookings of a member (member history)
    Member(MemberId),
}

/// Secondary-index query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookingQuery {
    /// Owner to list for
    pub filter: BookingFilter,
    /// Restrict to one status
    pub status: Option<BookingStatus>,
}

impl BookingQuery {
    /// Every booking of a session
    #[must_use]
    pub const fn session(session_id: SessionId) -> Self {
        Self {
            filter: BookingFilter::Session(session_id),
            status: None,
        }
    }

    /// A session's waitlist, in promotion order
    #[must_use]
    pub const fn waitlist(session_id: SessionId) -> Self {
        Self {
            filter: BookingFilter::Session(session_id),
            status: Some(BookingStatus::Waitlisted),
        }
    }
}

/// Rows written together by one allocator call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeSet {
    /// Session row with its updated occupancy
    pub session: ClassSession,
    /// Created or updated bookings of that session
    pub bookings: Vec<Booking>,
}

/// Persistent store for sessions and bookings
///
/// Query results are ordered by `(requested_at, booking id)`.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Loads a session row
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn get_session(&self, id: SessionId) -> Result<Option<ClassSession>, StorageError>;

    /// Inserts or replaces a session row
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn put_session(&self, session: ClassSession) -> Result<(), StorageError>;

    /// Loads a booking row
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StorageError>;

    /// Lists bookings through the secondary indexes
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    async fn query_by_index(&self, query: BookingQuery) -> Result<Vec<Booking>, StorageError>;

    /// Writes a session and its changed bookings atomically
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails; nothing is written in that case.
    async fn commit(&self, changes: ChangeSet) -> Result<(), StorageError>;
}

type SessionIndexKey = (SessionId, BookingStatus, DateTime<Utc>, BookingId);
type MemberIndexKey = (MemberId, DateTime<Utc>, BookingId);

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<SessionId, ClassSession>,
    bookings: HashMap<BookingId, Booking>,
    by_session: BTreeSet<SessionIndexKey>,
    by_member: BTreeSet<MemberIndexKey>,
}

impl Tables {
    fn upsert_booking(&mut self, booking: Booking) {
        if let Some(previous) = self.bookings.get(&booking.id) {
            self.by_session.remove(&session_key(previous));
            self.by_member.remove(&member_key(previous));
        }
        self.by_session.insert(session_key(&booking));
        self.by_member.insert(member_key(&booking));
        self.bookings.insert(booking.id, booking);
    }

    fn rows(&self, ids: impl Iterator<Item = BookingId>) -> Vec<Booking> {
        ids.filter_map(|id| self.bookings.get(&id).cloned()).collect()
    }

    fn query(&self, query: BookingQuery) -> Vec<Booking> {
        match (query.filter, query.status) {
            (BookingFilter::Session(session_id), Some(status)) => {
                let start = (session_id, status, DateTime::<Utc>::MIN_UTC, lowest_booking_id());
                self.rows(
                    self.by_session
                        .range(start..)
                        .take_while(|(s, st, _, _)| *s == session_id && *st == status)
                        .map(|(_, _, _, id)| *id),
                )
            }
            (BookingFilter::Session(session_id), None) => {
                // Confirmed sorts first among statuses.
                let start = (
                    session_id,
                    BookingStatus::Confirmed,
                    DateTime::<Utc>::MIN_UTC,
                    lowest_booking_id(),
                );
                let mut keys: Vec<&SessionIndexKey> = self
                    .by_session
                    .range(start..)
                    .take_while(|(s, _, _, _)| *s == session_id)
                    .collect();
                keys.sort_by_key(|(_, _, at, id)| (*at, *id));
                self.rows(keys.into_iter().map(|(_, _, _, id)| *id))
            }
            (BookingFilter::Member(member_id), status) => {
                let start = (member_id, DateTime::<Utc>::MIN_UTC, lowest_booking_id());
                let mut rows = self.rows(
                    self.by_member
                        .range(start..)
                        .take_while(|(m, _, _)| *m == member_id)
                        .map(|(_, _, id)| *id),
                );
                if let Some(status) = status {
                    rows.retain(|b| b.status == status);
                }
                rows
            }
        }
    }
}

const fn session_key(booking: &Booking) -> SessionIndexKey {
    (booking.session_id, booking.status, booking.requested_at, booking.id)
}

const fn member_key(booking: &Booking) -> MemberIndexKey {
    (booking.member_id, booking.requested_at, booking.id)
}

const fn lowest_booking_id() -> BookingId {
    BookingId::from_uuid(Uuid::nil())
}

/// In-memory store for tests and the demo binary
///
/// Keeps a `(session, status, requested_at, id)` index so waitlist queries
/// come back already in promotion order.
///
/// # Example
///
/// ```
/// use class_booking::storage::{BookingQuery, BookingStore, InMemoryBookingStore};
/// use class_booking::types::SessionId;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryBookingStore::new();
/// let waitlist = store.query_by_index(BookingQuery::waitlist(SessionId::new())).await?;
/// assert!(waitlist.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryBookingStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryBookingStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bookings
    ///
    /// # Errors
    ///
    /// Returns error if the tables are poisoned.
    pub fn booking_count(&self) -> Result<usize, StorageError> {
        Ok(self.tables.read().map_err(|_| StorageError::Poisoned)?.bookings.len())
    }

    /// Replace a booking row without touching its session.
    ///
    /// Bypasses the allocator; meant for seeding fixtures and for simulating
    /// corrupted data in tests.
    ///
    /// # Errors
    ///
    /// Returns error if the tables are poisoned.
    pub fn seed_booking(&self, booking: Booking) -> Result<(), StorageError> {
        self.tables
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .upsert_booking(booking);
        Ok(())
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn get_session(&self, id: SessionId) -> Result<Option<ClassSession>, StorageError> {
        let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        Ok(tables.sessions.get(&id).cloned())
    }

    async fn put_session(&self, session: ClassSession) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        tables.sessions.insert(session.id(), session);
        Ok(())
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StorageError> {
        let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        Ok(tables.bookings.get(&id).cloned())
    }

    async fn query_by_index(&self, query: BookingQuery) -> Result<Vec<Booking>, StorageError> {
        let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        Ok(tables.query(query))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        for booking in changes.bookings {
            tables.upsert_booking(booking);
        }
        tables.sessions.insert(changes.session.id(), changes.session);
        Ok(())
    }
}
