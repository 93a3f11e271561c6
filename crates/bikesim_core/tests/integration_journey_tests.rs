//! Full journey chains, with and without reservations.

mod support;

use bikesim_core::clock::{EventKind, SimulationClock};
use bikesim_core::ecs::{Station, User, UserState};
use bikesim_core::profiling::EventMetrics;
use bikesim_core::reservations::{ReservationKind, ReservationState, Reservations};
use bikesim_core::scenario::EntryPoint;
use bikesim_core::strategies::UserTypeTag;
use bikesim_core::telemetry::SimTelemetry;
use support::world::TestWorldBuilder;

/// Walk-up chain: appear, rent without reservation, return without
/// reservation, leave. The naive user never reserves.
#[test]
fn walkup_journey_terminates_with_empty_queue() {
    let mut tw = TestWorldBuilder::new()
        .with_seed(21)
        .with_station(40.4200, -3.7000, 2, 1)
        .with_entry_point(EntryPoint::Single {
            instant: 0,
            latitude: 40.4210,
            longitude: -3.7000,
            user_type: UserTypeTag::Uninformed,
            destination: Some((40.4195, -3.7005)),
        })
        .build();
    tw.run(1_000);

    assert!(tw.world.resource::<SimulationClock>().is_empty());

    let metrics = tw.world.resource::<EventMetrics>();
    assert_eq!(metrics.count(EventKind::UserAppears), 1);
    assert_eq!(
        metrics.count(EventKind::ArrivesAtStationToRentBikeWithoutReservation),
        1
    );
    assert_eq!(
        metrics.count(EventKind::ArrivesAtStationToReturnBikeWithoutReservation),
        1
    );
    assert_eq!(
        metrics.count(EventKind::ArrivesAtStationToRentBikeWithReservation),
        0,
        "the naive user never reserves"
    );

    let user = tw.world.query::<&User>().single(&tw.world);
    assert_eq!(user.state, UserState::LeftSystem);
    assert!(!user.has_bike());
    assert!(tw.world.resource::<Reservations>().is_empty());

    let station = tw.world.query::<&Station>().single(&tw.world);
    assert_eq!(station.docked_count(), 1);
}

/// Reserved chain: bike reservation resolves on arrival, the slot
/// reservation at a second station resolves on return, and the user walks to
/// the final destination.
#[test]
fn reserved_journey_resolves_both_reservations() {
    let mut tw = TestWorldBuilder::new()
        .with_seed(4)
        .with_station(40.4200, -3.7000, 2, 2)
        .with_station(40.4215, -3.7000, 2, 0)
        .with_entry_point(EntryPoint::Single {
            instant: 0,
            latitude: 40.42008,
            longitude: -3.7000,
            user_type: UserTypeTag::Obedient,
            destination: Some((40.4216, -3.7001)),
        })
        .build();
    tw.run(1_000);

    let reservations = tw.world.resource::<Reservations>();
    let successful_bike = reservations
        .all()
        .iter()
        .filter(|r| r.kind == ReservationKind::Bike && r.state == ReservationState::Successful)
        .count();
    let successful_slot = reservations
        .all()
        .iter()
        .filter(|r| r.kind == ReservationKind::Slot && r.state == ReservationState::Successful)
        .count();
    assert_eq!(successful_bike, 1);
    assert_eq!(successful_slot, 1);

    let metrics = tw.world.resource::<EventMetrics>();
    assert_eq!(
        metrics.count(EventKind::ArrivesAtStationToRentBikeWithReservation),
        1
    );
    assert_eq!(
        metrics.count(EventKind::ArrivesAtStationToReturnBikeWithReservation),
        1
    );
    assert_eq!(metrics.count(EventKind::UserArrivesAtDestinationInCity), 1);

    let stations = tw.station_entities();
    let rent_station = tw.world.get::<Station>(stations[0]).expect("station");
    assert_eq!(rent_station.docked_count(), 1, "one bike rented here");
    let return_station = tw.world.get::<Station>(stations[1]).expect("station");
    assert_eq!(return_station.docked_count(), 1, "the bike was docked here");
    assert_eq!(return_station.reserved_slots(), 0);

    let telemetry = tw.world.resource::<SimTelemetry>();
    assert_eq!(telemetry.completed_journeys(), 1);
    assert_eq!(telemetry.abandoned_journeys(), 0);

    let user = tw.world.query::<&User>().single(&tw.world);
    assert_eq!(user.state, UserState::LeftSystem);
    assert!(!user.has_bike());
}

/// A walk-up at a station that emptied in the meantime feeds the memory and
/// triggers a re-decision instead of an error.
#[test]
fn drained_station_reroutes_the_walkup_user() {
    let mut tw = TestWorldBuilder::new()
        .with_seed(13)
        .with_reservation_validity(600)
        .with_station(40.4200, -3.7000, 1, 1)
        .with_station(40.4214, -3.7000, 2, 1)
        // The obedient user reserves the only bike of the near station...
        .with_user(0, 40.42008, -3.7000, UserTypeTag::Obedient)
        // ...the naive user walks up to the same station and finds it drained.
        .with_user(1, 40.42004, -3.7000, UserTypeTag::Uninformed)
        .build();
    tw.run(2_000);

    let users = tw.user_entities();
    let naive = tw.world.get::<User>(users[1]).expect("user");
    assert!(
        naive.memory.failed_rentals() >= 1,
        "the empty station went into the naive user's memory"
    );

    let stations = tw.station_entities();
    let telemetry = tw.world.resource::<SimTelemetry>();
    assert!(
        telemetry.station_stats(stations[0]).failed_rentals >= 1,
        "the drained station recorded a failed rental"
    );
}
