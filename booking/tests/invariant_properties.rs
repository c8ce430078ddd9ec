//! Property tests: random interleavings of member and staff operations.
//!
//! After every operation, successful or not, the stored session must satisfy
//! the occupancy and uniqueness invariants.

#![allow(clippy::unwrap_used, clippy::cast_possible_truncation)]

use chrono::Duration;
use class_booking::{
    Booking, BookingConfig, BookingError, BookingFilter, BookingId, BookingService, BookingStatus,
    InMemoryBookingStore, MemberId, NewSession, SessionId,
};
use class_booking_testing::{test_epoch, ManualClock};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Op {
    /// Book for member `n` of the pool
    Book(usize),
    /// Cancel the `n`th known booking
    Cancel(usize),
    /// Check in the `n`th known booking
    CheckIn(usize),
    /// Mark the `n`th known booking as no-show
    NoShow(usize),
    /// Move the clock forward by `n` minutes
    Tick(u8),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..8_usize).prop_map(Op::Book),
        3 => (0..16_usize).prop_map(Op::Cancel),
        1 => (0..16_usize).prop_map(Op::CheckIn),
        1 => (0..16_usize).prop_map(Op::NoShow),
        1 => (0..40_u8).prop_map(Op::Tick),
    ]
}

struct World {
    service: BookingService,
    clock: ManualClock,
    session_id: SessionId,
    capacity: u32,
    members: Vec<MemberId>,
    known: Vec<BookingId>,
}

impl World {
    async fn new(capacity: u32) -> Self {
        let clock = ManualClock::new(test_epoch());
        let service = BookingService::new(
            Arc::new(InMemoryBookingStore::new()),
            Arc::new(clock.clone()),
            BookingConfig::default(),
        );
        let session_id = service
            .schedule_session(NewSession {
                title: "Property".to_string(),
                trainer: "Quinn".to_string(),
                location: "Lab".to_string(),
                start_time: test_epoch() + Duration::hours(1),
                end_time: test_epoch() + Duration::hours(2),
                capacity,
            })
            .await
            .unwrap()
            .id();

        Self {
            service,
            clock,
            session_id,
            capacity,
            members: (0..8).map(|_| MemberId::new()).collect(),
            known: Vec::new(),
        }
    }

    fn pick(&self, index: usize) -> Option<BookingId> {
        if self.known.is_empty() {
            None
        } else {
            Some(self.known[index % self.known.len()])
        }
    }

    async fn bookings(&self) -> Vec<Booking> {
        self.service
            .list_bookings(BookingFilter::Session(self.session_id), None)
            .await
            .unwrap()
    }

    async fn waitlist_head(&self) -> Option<BookingId> {
        self.service
            .list_bookings(
                BookingFilter::Session(self.session_id),
                Some(BookingStatus::Waitlisted),
            )
            .await
            .unwrap()
            .first()
            .map(|b| b.id)
    }

    async fn apply(&mut self, op: &Op) {
        match op {
            Op::Book(member) => {
                let member_id = self.members[*member];
                self.clock.advance(Duration::seconds(1));
                let started = self.clock_has_passed_start();
                let requested = self.service.request_booking(self.session_id, member_id).await;
                if started {
                    assert!(
                        matches!(requested, Err(BookingError::SessionStarted(_))),
                        "booking after start must be refused"
                    );
                }
                if let Ok(receipt) = requested {
                    self.known.push(receipt.booking_id);
                }
            }
            Op::Cancel(n) => {
                let Some(booking_id) = self.pick(*n) else { return };
                let before = self.service.get_booking(booking_id).await.unwrap();
                let occupancy_before = self.occupancy().await;
                let expected_head = self.waitlist_head().await;
                let started = self.clock_has_passed_start();

                let Ok(receipt) = self.service.cancel_booking(booking_id).await else { return };

                match before.status {
                    BookingStatus::Waitlisted => {
                        assert_eq!(self.occupancy().await, occupancy_before);
                        assert_eq!(receipt.promoted, None);
                    }
                    BookingStatus::Confirmed if !started => {
                        assert_eq!(receipt.promoted, expected_head);
                    }
                    _ => assert_eq!(receipt.promoted, None),
                }
            }
            Op::CheckIn(n) => {
                if let Some(booking_id) = self.pick(*n) {
                    let _ = self.service.check_in(booking_id).await;
                }
            }
            Op::NoShow(n) => {
                if let Some(booking_id) = self.pick(*n) {
                    let occupancy_before = self.occupancy().await;
                    if self.service.mark_no_show(booking_id).await.is_ok() {
                        assert_eq!(self.occupancy().await, occupancy_before);
                    }
                }
            }
            Op::Tick(minutes) => self.clock.advance(Duration::minutes(i64::from(*minutes))),
        }
    }

    fn clock_has_passed_start(&self) -> bool {
        use class_booking_core::environment::Clock;
        self.clock.now() >= test_epoch() + Duration::hours(1)
    }

    async fn occupancy(&self) -> u32 {
        self.service
            .session_occupancy(self.session_id)
            .await
            .unwrap()
            .current_bookings
    }

    async fn check_invariants(&self) {
        let bookings = self.bookings().await;
        let occupancy = self.occupancy().await;

        let seated = bookings.iter().filter(|b| b.status.holds_seat()).count() as u32;
        assert_eq!(occupancy, seated, "counter must match seated bookings");
        assert!(occupancy <= self.capacity, "occupancy {occupancy} over capacity");

        let mut active = HashSet::new();
        for booking in bookings.iter().filter(|b| b.status.is_active()) {
            assert!(
                active.insert(booking.member_id),
                "member {} holds two active bookings",
                booking.member_id
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: occupancy, uniqueness and FIFO promotion hold under any interleaving.
    #[test]
    fn prop_invariants_hold(capacity in 1..5_u32, ops in prop::collection::vec(arb_op(), 1..60)) {
        tokio_test::block_on(async {
            let mut world = World::new(capacity).await;
            for op in &ops {
                world.apply(op).await;
                world.check_invariants().await;
            }
        });
    }
}
