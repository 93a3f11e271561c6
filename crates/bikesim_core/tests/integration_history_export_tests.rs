//! History sink and parquet export round.

mod support;

use std::fs::File;

use bikesim_core::clock::EventKind;
use bikesim_core::history::SimHistory;
use bikesim_core::history_export::{
    write_events_parquet, write_reservations_parquet, write_stations_parquet, write_users_parquet,
};
use bikesim_core::reservations::Reservations;
use bikesim_core::scenario::EntryPoint;
use bikesim_core::strategies::UserTypeTag;
use parquet::file::reader::{FileReader, SerializedFileReader};
use support::world::TestWorldBuilder;

fn parquet_rows(path: &std::path::Path) -> i64 {
    let file = File::open(path).expect("exported file opens");
    let reader = SerializedFileReader::new(file).expect("valid parquet");
    reader.metadata().file_metadata().num_rows()
}

#[test]
fn history_records_every_executed_event_and_exports() {
    let mut tw = TestWorldBuilder::new()
        .with_seed(31)
        .with_station(40.4200, -3.7000, 2, 1)
        .with_station(40.4215, -3.7000, 2, 1)
        .with_entry_point(EntryPoint::Single {
            instant: 0,
            latitude: 40.42008,
            longitude: -3.7000,
            user_type: UserTypeTag::Obedient,
            destination: Some((40.4216, -3.7001)),
        })
        .build();
    let steps = tw.run(1_000);

    let history = tw.world.resource::<SimHistory>();
    assert_eq!(history.entries().len(), steps);
    assert_eq!(history.initial_stations.len(), 2);
    assert_eq!(history.initial_users.len(), 1);
    assert_eq!(history.entries()[0].kind, EventKind::UserAppears);
    assert!(
        history.entries().iter().all(|e| !e.touched.is_empty()),
        "every executed event reports the entities it touched"
    );
    // Instants never decrease along the executed sequence.
    for pair in history.entries().windows(2) {
        assert!(pair[0].instant <= pair[1].instant);
    }

    let dir = std::env::temp_dir().join("bikesim_export_test");
    std::fs::create_dir_all(&dir).expect("temp dir");
    let events_path = dir.join("events.parquet");
    let stations_path = dir.join("stations.parquet");
    let users_path = dir.join("users.parquet");
    let reservations_path = dir.join("reservations.parquet");

    write_events_parquet(&events_path, history).expect("events export");
    write_stations_parquet(&stations_path, history).expect("stations export");
    write_users_parquet(&users_path, history).expect("users export");
    let reservations = tw.world.resource::<Reservations>();
    write_reservations_parquet(&reservations_path, reservations).expect("reservations export");

    assert_eq!(parquet_rows(&events_path), steps as i64);
    assert_eq!(parquet_rows(&stations_path), 2);
    assert_eq!(parquet_rows(&users_path), 1);
    assert_eq!(parquet_rows(&reservations_path), reservations.len() as i64);
}
