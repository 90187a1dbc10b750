use crate::run_result::{RunResult, RunTally, SummaryMetrics};
use anyhow::{Context, Result};
use station_control::{Driver, OperatorController, OperatorPolicy};
use station_core::{Event, MetricsFileWriter, MetricsRow, StationConfig};
use station_world::RunInfo;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

pub struct SeedResult {
    pub seed: u64,
    pub summary: SummaryMetrics,
    pub run_id: String,
}

/// Per-seed inputs shared by every run of a scenario.
pub struct SeedRun<'a> {
    pub config: &'a StationConfig,
    pub policy: &'a OperatorPolicy,
    pub cycles: u64,
    pub scenario_name: &'a str,
    pub scenario_params: &'a serde_json::Value,
}

pub fn run_seed(run: &SeedRun<'_>, seed: u64, seed_dir: &Path) -> Result<SeedResult> {
    let run_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    std::fs::create_dir_all(seed_dir)
        .with_context(|| format!("creating seed directory: {}", seed_dir.display()))?;
    station_world::write_run_info(
        seed_dir,
        &RunInfo {
            run_id: run_id.clone(),
            seed,
            runner: "station_bench".to_string(),
            cycles: run.cycles,
            config: run.config.clone(),
        },
    )?;

    let engine = station_world::build_engine(run.config.clone(), seed, 0)?;
    let mut driver = Driver::new(engine, OperatorController::new(run.policy.clone()), 0);
    let mut metrics_writer = MetricsFileWriter::new(seed_dir.to_path_buf())
        .with_context(|| format!("opening metrics CSV in {}", seed_dir.display()))?;

    let mut tally = RunTally::default();
    let mut write_error = None;
    driver.run_cycles(run.cycles, |engine, events| {
        tally.observe(events);
        let Some(completed) = events
            .iter()
            .rfind(|e| matches!(e.event, Event::CycleCompleted { .. }))
        else {
            return;
        };
        if write_error.is_none() {
            let row = MetricsRow::sample(completed.at_ms, &engine.metrics());
            write_error = metrics_writer.write_row(&row).err();
        }
    })?;
    if let Some(err) = write_error {
        return Err(err).context("writing metrics row");
    }
    metrics_writer.flush().context("flushing metrics")?;

    let summary = tally.finish(&driver.engine().metrics());

    #[allow(clippy::cast_possible_truncation)]
    let wall_time_ms = start.elapsed().as_millis() as u64;
    let sim_cycles_per_second = if wall_time_ms > 0 {
        summary.cycles_completed as f64 / (wall_time_ms as f64 / 1000.0)
    } else {
        0.0
    };

    let run_result = RunResult {
        run_schema_version: 1,
        run_status: "completed".to_string(),
        run_id: run_id.clone(),
        seed,
        scenario_name: run.scenario_name.to_string(),
        scenario_params: run.scenario_params.clone(),
        cycles_requested: run.cycles,
        sim_time_ms: driver.now_ms(),
        wall_time_ms,
        sim_cycles_per_second,
        summary_metrics: summary.clone(),
        metrics_path: "metrics_000.csv".to_string(),
    };
    run_result
        .write_atomic(&seed_dir.join("run_result.json"))
        .context("writing run_result.json")?;

    Ok(SeedResult {
        seed,
        summary,
        run_id,
    })
}
