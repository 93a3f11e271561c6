//! Simulation runner: advances the clock and routes events into the ECS.
//!
//! Each step pops the earliest event from [`SimulationClock`], reports it to
//! the history sink, inserts it as [`CurrentEvent`] and runs the schedule;
//! after the schedule the touched-entity snapshots complete the history
//! entry. The loop is synchronous and single-threaded: the queue ordering is
//! the only concurrency-control mechanism.

use bevy_ecs::prelude::{Res, Schedule, World};
use bevy_ecs::schedule::IntoSystemConfigs;
use tracing::debug;

use crate::clock::{CurrentEvent, Event, EventKind, SimulationClock};
use crate::history::{capture_touched, SimHistory};
use crate::profiling::EventMetrics;
use crate::systems::{
    arrives_destination::arrives_destination_system,
    bike_reservation_timeout::bike_reservation_timeout_system,
    rent_with_reservation::rent_with_reservation_system,
    rent_without_reservation::rent_without_reservation_system,
    return_with_reservation::return_with_reservation_system,
    return_without_reservation::return_without_reservation_system,
    slot_reservation_timeout::slot_reservation_timeout_system,
    user_appears::user_appears_system,
    wants_to_return::wants_to_return_system,
};

// Condition functions for each event kind
fn is_user_appears(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::UserAppears)
        .unwrap_or(false)
}

fn is_bike_reservation_timeout(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::BikeReservationTimeout)
        .unwrap_or(false)
}

fn is_slot_reservation_timeout(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::SlotReservationTimeout)
        .unwrap_or(false)
}

fn is_rent_with_reservation(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::ArrivesAtStationToRentBikeWithReservation)
        .unwrap_or(false)
}

fn is_rent_without_reservation(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::ArrivesAtStationToRentBikeWithoutReservation)
        .unwrap_or(false)
}

fn is_wants_to_return(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::UserWantsToReturnBike)
        .unwrap_or(false)
}

fn is_return_with_reservation(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::ArrivesAtStationToReturnBikeWithReservation)
        .unwrap_or(false)
}

fn is_return_without_reservation(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::ArrivesAtStationToReturnBikeWithoutReservation)
        .unwrap_or(false)
}

fn is_arrives_destination(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::UserArrivesAtDestinationInCity)
        .unwrap_or(false)
}

/// Runs one simulation step: pops the next event, reports it to the history
/// sink, inserts it as [`CurrentEvent`], runs the schedule and completes the
/// history entry. Returns `false` when the queue is empty.
pub fn run_next_event(world: &mut World, schedule: &mut Schedule) -> bool {
    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(event) => event,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));

    if let Some(mut metrics) = world.get_resource_mut::<EventMetrics>() {
        metrics.record_event(event.kind);
    }
    if let Some(mut history) = world.get_resource_mut::<SimHistory>() {
        history.record_dequeued(&event);
    }
    debug!(kind = event.kind.tag(), instant = event.instant, seq = event.seq, "executing");

    schedule.run(world);

    let touched = capture_touched(world, &event);
    if let Some(mut history) = world.get_resource_mut::<SimHistory>() {
        history.record_executed(touched);
    }
    true
}

/// Runs one simulation step and invokes `hook` after the schedule completes.
pub fn run_next_event_with_hook<F>(world: &mut World, schedule: &mut Schedule, mut hook: F) -> bool
where
    F: FnMut(&World, &Event),
{
    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(event) => event,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));

    if let Some(mut metrics) = world.get_resource_mut::<EventMetrics>() {
        metrics.record_event(event.kind);
    }
    if let Some(mut history) = world.get_resource_mut::<SimHistory>() {
        history.record_dequeued(&event);
    }

    schedule.run(world);

    let touched = capture_touched(world, &event);
    if let Some(mut history) = world.get_resource_mut::<SimHistory>() {
        history.record_executed(touched);
    }
    hook(world, &event);
    true
}

/// Runs simulation steps until the event queue is empty or `max_steps` is
/// reached. Returns the number of steps executed.
pub fn run_until_empty(world: &mut World, schedule: &mut Schedule, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && run_next_event(world, schedule) {
        steps += 1;
    }
    steps
}

/// Runs simulation steps until empty and invokes `hook` after each step.
pub fn run_until_empty_with_hook<F>(
    world: &mut World,
    schedule: &mut Schedule,
    max_steps: usize,
    mut hook: F,
) -> usize
where
    F: FnMut(&World, &Event),
{
    let mut steps = 0;
    while steps < max_steps && run_next_event_with_hook(world, schedule, &mut hook) {
        steps += 1;
    }
    steps
}

/// Drives the run until the queue is empty.
pub fn run_to_completion(world: &mut World, schedule: &mut Schedule) -> usize {
    run_until_empty(world, schedule, usize::MAX)
}

/// Builds the default simulation schedule: one system per event kind, gated
/// on the current event so only the matching system does any work.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((
        // UserAppears
        user_appears_system.run_if(is_user_appears),
        // BikeReservationTimeout
        bike_reservation_timeout_system.run_if(is_bike_reservation_timeout),
        // SlotReservationTimeout
        slot_reservation_timeout_system.run_if(is_slot_reservation_timeout),
        // ArrivesAtStationToRentBikeWithReservation
        rent_with_reservation_system.run_if(is_rent_with_reservation),
        // ArrivesAtStationToRentBikeWithoutReservation
        rent_without_reservation_system.run_if(is_rent_without_reservation),
        // UserWantsToReturnBike
        wants_to_return_system.run_if(is_wants_to_return),
        // ArrivesAtStationToReturnBikeWithReservation
        return_with_reservation_system.run_if(is_return_with_reservation),
        // ArrivesAtStationToReturnBikeWithoutReservation
        return_without_reservation_system.run_if(is_return_without_reservation),
        // UserArrivesAtDestinationInCity
        arrives_destination_system.run_if(is_arrives_destination),
    ));
    schedule
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_clock_means_zero_steps() {
        let mut world = World::new();
        world.insert_resource(SimulationClock::default());
        let mut schedule = simulation_schedule();
        assert_eq!(run_until_empty(&mut world, &mut schedule, 100), 0);
    }
}
