pub mod clock;
pub mod ecs;
pub mod history;
pub mod history_export;
pub mod memory;
pub mod profiling;
pub mod recommendation;
pub mod reservations;
pub mod rngs;
pub mod routing;
pub mod runner;
pub mod scenario;
pub mod spatial;
pub mod strategies;
pub mod systems;
pub mod telemetry;
