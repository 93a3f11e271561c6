pub mod arrives_destination;
pub mod bike_reservation_timeout;
pub mod common;
pub mod rent_with_reservation;
pub mod rent_without_reservation;
pub mod return_with_reservation;
pub mod return_without_reservation;
pub mod slot_reservation_timeout;
pub mod user_appears;
pub mod wants_to_return;
