use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use station_control::{Driver, OperatorController, OperatorPolicy};
use station_core::{
    CycleOutcome, Event, EventEnvelope, MetricsFileWriter, MetricsRow, NormalSource, StationEngine,
};
use station_world::{
    build_engine, create_run_dir, generate_run_id, resolve_config, settings_summary,
    write_run_info, ConfigOverrides, RunInfo,
};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "station_cli", about = "Manufacturing station simulation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the station on virtual time until a number of products are finished.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    cycles: u64,
    /// Random seed; a fresh one is drawn when omitted.
    #[arg(long)]
    seed: Option<u64>,
    /// Station config JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ideal cycle time in seconds.
    #[arg(long = "cycle-time")]
    cycle_time_s: Option<u64>,
    /// Power consumption in kW at the ideal cycle time.
    #[arg(long = "power-consumption")]
    power_consumption_kw: Option<f64>,
    /// Periodically drive pressure high for alert simulation.
    #[arg(long)]
    generate_alerts: bool,
    /// Seconds a faulted station waits before the operator resets it.
    #[arg(long, default_value_t = 30)]
    repair_time: u64,
    #[arg(long, default_value_t = 100)]
    print_every: u64,
    /// Disable automatic metrics collection to runs/ directory.
    #[arg(long)]
    no_metrics: bool,
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

fn run(args: RunArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        cycle_time_s: args.cycle_time_s,
        power_consumption_kw: args.power_consumption_kw,
        generate_alerts: args.generate_alerts.then_some(true),
    };
    let config = resolve_config(args.config.as_deref(), &overrides)?;
    let seed = args.seed.unwrap_or_else(rand::random);
    let engine = build_engine(config.clone(), seed, 0)?;

    // Set up per-run metrics directory.
    let mut metrics_writer: Option<MetricsFileWriter> = None;
    if !args.no_metrics {
        let run_id = generate_run_id(seed);
        let run_dir = create_run_dir(&PathBuf::from("runs"), &run_id)?;
        write_run_info(
            &run_dir,
            &RunInfo {
                run_id,
                seed,
                runner: "station_cli".to_string(),
                cycles: args.cycles,
                config: config.clone(),
            },
        )?;
        let writer = MetricsFileWriter::new(run_dir.clone())
            .with_context(|| format!("opening metrics CSV in {}", run_dir.display()))?;
        metrics_writer = Some(writer);
        println!("Run directory: {}", run_dir.display());
    }

    let operator = OperatorController::new(OperatorPolicy {
        fault_repair_ms: args.repair_time.saturating_mul(1000),
        ..OperatorPolicy::default()
    });
    let mut driver = Driver::new(engine, operator, 0);

    println!("Starting simulation: cycles={} seed={seed}", args.cycles);
    for line in settings_summary(&config) {
        println!("{line}");
    }
    println!("{}", "-".repeat(80));

    let print_every = args.print_every.max(1);
    let mut write_error = None;
    driver.run_cycles(args.cycles, |engine, events| {
        for event in events {
            print_notable(event);
        }
        if !events
            .iter()
            .any(|e| matches!(e.event, Event::CycleCompleted { .. }))
        {
            return;
        }
        let metrics = engine.metrics();
        if metrics.total_products() % print_every == 0 {
            print_status(engine, events.last().map_or(0, |e| e.at_ms));
        }
        if write_error.is_some() {
            return;
        }
        if let Some(writer) = metrics_writer.as_mut() {
            let at_ms = events.last().map_or(0, |e| e.at_ms);
            if let Err(err) = writer.write_row(&MetricsRow::sample(at_ms, &metrics)) {
                write_error = Some(err);
            }
        }
    })?;
    if let Some(err) = write_error {
        return Err(err).context("writing metrics row");
    }

    println!("{}", "-".repeat(80));
    println!("Done. Final state at t={} ms:", driver.now_ms());
    print_status(driver.engine(), driver.now_ms());

    if let Some(ref mut writer) = metrics_writer {
        writer.flush().context("final metrics flush")?;
        println!("Metrics written to runs/ directory.");
    }

    Ok(())
}

/// Faults and pressure events are printed regardless of `print_every`.
fn print_notable(event: &EventEnvelope) {
    match &event.event {
        Event::CycleCompleted {
            serial_number,
            outcome: CycleOutcome::Fault,
            ..
        } => println!(
            "*** STATION FAULT while producing #{serial_number} at t={} ms ***",
            event.at_ms
        ),
        Event::HighPressureTimerArmed { release_at_ms } => println!(
            "*** HIGH PRESSURE at t={} ms, automatic release at t={release_at_ms} ms ***",
            event.at_ms
        ),
        Event::StationReset { faulty_time_ms } => println!(
            "*** STATION RESET at t={} ms after {faulty_time_ms} ms in fault ***",
            event.at_ms
        ),
        _ => {}
    }
}

fn print_status<N: NormalSource>(engine: &StationEngine<N>, now_ms: u64) {
    let m = engine.metrics();
    let hours = now_ms / 3_600_000;
    let minutes = (now_ms % 3_600_000) / 60_000;
    println!(
        "[t={hours:03}h{minutes:02}m]  status={status:<16}  serial={serial:6}  \
         made={made:6}  discarded={discarded:5}  faulty_ms={faulty:7}  \
         energy_kwh={energy:.4}  pressure_mbar={pressure:7.1}  cycle_ms={cycle}",
        status = m.status.label(),
        serial = m.product_serial_number,
        made = m.number_of_manufactured_products,
        discarded = m.number_of_discarded_products,
        faulty = m.faulty_time_ms,
        energy = m.energy_consumption_kwh,
        pressure = m.pressure_mbar,
        cycle = m.actual_cycle_time_ms,
    );
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args)?,
    }
    Ok(())
}
