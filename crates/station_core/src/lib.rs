//! `station_core`: manufacturing station simulation engine.
//!
//! No IO, no threads. Time comes in as milliseconds from the host; all
//! randomness via the injected `NormalSource`.

mod engine;
mod error;
mod fault_clock;
pub mod metrics;
mod pressure;
pub mod random;
mod scheduler;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

pub use engine::{
    cycle_time_modifier, energy_consumption_kwh, planned_cycle_time_ms, validate_config,
    StationEngine,
};
pub use error::StationError;
pub use fault_clock::FaultClock;
pub use metrics::{MetricsFileWriter, MetricsRow};
pub use pressure::{PressureModel, PressureStep};
pub use random::{BoxMuller, NormalSource, ScriptedNormals};
pub use scheduler::{CycleScheduler, PendingCycle};
pub use types::*;

/// Wraps `event` in an envelope carrying the next sequential id.
pub fn emit(counters: &mut Counters, at_ms: u64, event: Event) -> EventEnvelope {
    let id = EventId(format!("evt_{:06}", counters.next_event_id));
    counters.next_event_id += 1;
    EventEnvelope { id, at_ms, event }
}

#[cfg(test)]
mod tests;
