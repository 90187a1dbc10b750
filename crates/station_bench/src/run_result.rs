use serde::Serialize;
use station_core::{CycleOutcome, Event, EventEnvelope, ReleaseTrigger, StationMetrics};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct RunResult {
    pub run_schema_version: u32,
    pub run_status: String,
    pub run_id: String,
    pub seed: u64,
    pub scenario_name: String,
    pub scenario_params: serde_json::Value,
    pub cycles_requested: u64,
    pub sim_time_ms: u64,
    pub wall_time_ms: u64,
    pub sim_cycles_per_second: f64,
    pub summary_metrics: SummaryMetrics,
    pub metrics_path: String,
}

/// Totals for one seed, accumulated from the event stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryMetrics {
    pub cycles_completed: u64,
    pub manufactured: u64,
    /// Parts discarded by quality control; faulted parts are counted separately.
    pub discarded: u64,
    pub faults: u64,
    pub total_faulty_time_ms: u64,
    pub total_energy_kwh: f64,
    pub mean_cycle_time_ms: f64,
    pub max_pressure_mbar: f64,
    pub valve_releases: u64,
    pub timer_releases: u64,
    pub failure_rate: f64,
    pub discard_rate: f64,
}

#[derive(Debug, Default)]
pub struct RunTally {
    metrics: SummaryMetrics,
    total_cycle_time_ms: u64,
}

impl RunTally {
    pub fn observe(&mut self, events: &[EventEnvelope]) {
        let m = &mut self.metrics;
        for envelope in events {
            match &envelope.event {
                Event::CycleCompleted {
                    outcome,
                    actual_cycle_time_ms,
                    energy_consumption_kwh,
                    pressure_mbar,
                    ..
                } => {
                    m.cycles_completed += 1;
                    match outcome {
                        CycleOutcome::Done => m.manufactured += 1,
                        CycleOutcome::Discarded => m.discarded += 1,
                        CycleOutcome::Fault => m.faults += 1,
                    }
                    m.total_energy_kwh += energy_consumption_kwh;
                    m.max_pressure_mbar = m.max_pressure_mbar.max(*pressure_mbar);
                    self.total_cycle_time_ms += actual_cycle_time_ms;
                }
                Event::StationReset { faulty_time_ms } => {
                    m.total_faulty_time_ms += faulty_time_ms;
                }
                Event::PressureReleased {
                    trigger: ReleaseTrigger::Valve,
                } => m.valve_releases += 1,
                Event::PressureReleased {
                    trigger: ReleaseTrigger::Timer,
                } => m.timer_releases += 1,
                _ => {}
            }
        }
    }

    /// Closes the tally. `final_metrics` is cross-checked against the counts.
    pub fn finish(self, final_metrics: &StationMetrics) -> SummaryMetrics {
        let mut m = self.metrics;
        debug_assert_eq!(m.manufactured, final_metrics.number_of_manufactured_products);
        debug_assert_eq!(
            m.discarded + m.faults,
            final_metrics.number_of_discarded_products
        );
        if m.cycles_completed > 0 {
            let n = m.cycles_completed as f64;
            m.mean_cycle_time_ms = self.total_cycle_time_ms as f64 / n;
            m.failure_rate = m.faults as f64 / n;
            m.discard_rate = m.discarded as f64 / n;
        }
        m
    }
}

impl RunResult {
    /// Write JSON atomically: write to `.tmp` then rename.
    pub fn write_atomic(&self, path: &Path) -> anyhow::Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
