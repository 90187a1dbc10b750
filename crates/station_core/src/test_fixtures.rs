//! Shared test fixtures for station_core and downstream crates.
//!
//! `scripted_engine()` replays exact normal draws so outcomes can be asserted;
//! `seeded_engine()` runs the real Box–Muller sampler over a fixed seed.

use crate::{BoxMuller, CycleOutcome, ScriptedNormals, StationConfig, StationEngine};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub fn base_config() -> StationConfig {
    StationConfig::default()
}

/// Alerts on, with a short stable window so the rising phase is reachable quickly.
pub fn alert_config() -> StationConfig {
    let mut config = StationConfig {
        generate_alerts: true,
        ..StationConfig::default()
    };
    config.constants.pressure_stable_time_ms = 10_000;
    config
}

pub fn make_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(42)
}

pub fn scripted_engine(config: StationConfig) -> StationEngine<ScriptedNormals> {
    StationEngine::new(config, ScriptedNormals::default(), 0).expect("fixture config is valid")
}

pub fn seeded_engine(config: StationConfig, seed: u64) -> StationEngine<BoxMuller<ChaCha8Rng>> {
    StationEngine::new(config, BoxMuller::new(ChaCha8Rng::seed_from_u64(seed)), 0)
        .expect("fixture config is valid")
}

/// Standard-normal draws, in engine order, for one cycle with no jitter that
/// ends in `outcome` and leaves pressure unchanged.
///
/// Execute draws jitter, then the failure roll, then (on failure) the overrun.
/// Completion draws the discard roll (skipped on failure), then the pressure sample.
pub fn cycle_draws(outcome: CycleOutcome) -> Vec<f64> {
    match outcome {
        CycleOutcome::Done => vec![0.0, 0.0, 0.0, 0.0],
        CycleOutcome::Discarded => vec![0.0, 0.0, 2.5, 0.0],
        CycleOutcome::Fault => vec![0.0, 3.5, 0.0, 0.0],
    }
}
