//! Class Booking - bounded-capacity class sessions with a FIFO waitlist
//!
//! Members book seats in scheduled class sessions. When a session is full the
//! booking joins its waitlist; when a confirmed booking is cancelled before the
//! class starts, the longest-waiting booking takes the seat. Staff check members
//! in, mark no-shows, and can close a session altogether.
//!
//! # Architecture
//!
//! ```text
//!  member / staff call
//!          │
//!          ▼
//!  ┌──────────────────┐  lock, load, commit   ┌──────────────┐
//!  │  BookingService  │──────────────────────▶│ BookingStore │
//!  └──────────────────┘                       └──────────────┘
//!          │ reduce
//!          ▼
//!  ┌──────────────────┐  advance   ┌─────────────┐
//!  │ CapacityAllocator│───────────▶│ transitions │
//!  └──────────────────┘            └─────────────┘
//!      │            │
//!      ▼            ▼
//!  ClassSession   BookingLedger
//!  (occupancy)    (bookings)
//! ```
//!
//! # Invariants
//!
//! For every session `current_bookings` equals the number of its confirmed,
//! attended and no-show bookings and never exceeds `capacity`. A member holds at most one
//! confirmed, waitlisted or attended booking per session.
//!
//! All mutations for one session run under that session's lock and are
//! committed in a single store call, so concurrent requests for the last seat
//! yield exactly one confirmation.

pub mod allocator;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod storage;
pub mod transitions;
pub mod types;

pub use allocator::{BookingAction, BookingEnvironment, CapacityAllocator, SessionState};
pub use config::{BookingConfig, Config, TelemetryConfig};
pub use error::{BookingError, Result};
pub use ledger::{Booking, BookingLedger};
pub use registry::{ClassSession, NewSession, SessionRegistry};
pub use service::BookingService;
pub use storage::{
    BookingFilter, BookingQuery, BookingStore, ChangeSet, InMemoryBookingStore, StorageError,
};
pub use transitions::Transition;
pub use types::{
    BookingId, BookingReceipt, BookingStatus, CancellationReceipt, Capacity, ClosureReceipt,
    MemberId, Occupancy, SessionId, SessionStatus, StatusReceipt,
};
