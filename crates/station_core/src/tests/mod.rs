use super::*;
use crate::test_fixtures::{alert_config, base_config, cycle_draws, scripted_engine, seeded_engine};

mod execute;

// --- Shared test helpers ------------------------------------------------

fn script(engine: &mut StationEngine<ScriptedNormals>, draws: impl IntoIterator<Item = f64>) {
    engine.normals_mut().extend(draws);
}

/// Draws for a jitter-free `Done` cycle whose pressure sample is `z` sigmas.
fn done_with_pressure(z: f64) -> Vec<f64> {
    vec![0.0, 0.0, 0.0, z]
}

/// Execute at `start_ms` and advance to the cycle's deadline. Returns the
/// completion time and the events it produced.
fn run_cycle<N: NormalSource>(
    engine: &mut StationEngine<N>,
    serial_number: u64,
    start_ms: u64,
) -> (u64, Vec<EventEnvelope>) {
    engine
        .execute(serial_number, start_ms)
        .expect("station should accept a new cycle");
    let due = engine
        .pending_cycle()
        .map(|c| c.due_ms)
        .expect("execute schedules a completion");
    (due, engine.advance(due))
}

fn completion(events: &[EventEnvelope]) -> Option<(CycleOutcome, u64, f64)> {
    events.iter().find_map(|e| match &e.event {
        Event::CycleCompleted {
            outcome,
            actual_cycle_time_ms,
            energy_consumption_kwh,
            ..
        } => Some((*outcome, *actual_cycle_time_ms, *energy_consumption_kwh)),
        _ => None,
    })
}
