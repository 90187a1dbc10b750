use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

mod run_result;
mod runner;
mod scenario;
mod summary;

#[derive(Parser)]
#[command(
    name = "station_bench",
    about = "Runs a station scenario across many seeds"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file across multiple seeds.
    Run {
        /// Path to the scenario JSON file.
        #[arg(long)]
        scenario: PathBuf,
        /// Output directory (default: runs/).
        #[arg(long, default_value = "runs")]
        output_dir: PathBuf,
    },
}

fn run(scenario_path: &Path, output_dir: &Path) -> Result<()> {
    let scenario = scenario::load_scenario(scenario_path)?;
    let seeds = scenario.seeds.expand();
    let config = station_world::resolve_config(scenario.config.as_deref(), &scenario.overrides)?;

    println!(
        "Loading scenario '{}': {} seeds × {} cycles",
        scenario.name,
        seeds.len(),
        scenario.cycles
    );
    for line in station_world::settings_summary(&config) {
        println!("{line}");
    }

    let scenario_params = serde_json::json!({
        "cycles": scenario.cycles,
        "config": config,
        "overrides": scenario.overrides,
        "operator": scenario.operator,
    });

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_dir = output_dir.join(format!("{}_{}", scenario.name, timestamp));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating output directory: {}", run_dir.display()))?;
    std::fs::copy(scenario_path, run_dir.join("scenario.json")).context("copying scenario file")?;

    println!("Output: {}", run_dir.display());
    println!("Running {} seeds in parallel...", seeds.len());

    let seed_run = runner::SeedRun {
        config: &config,
        policy: &scenario.operator,
        cycles: scenario.cycles,
        scenario_name: &scenario.name,
        scenario_params: &scenario_params,
    };
    let results: Vec<Result<runner::SeedResult>> = seeds
        .par_iter()
        .map(|&seed| runner::run_seed(&seed_run, seed, &run_dir.join(format!("seed_{seed}"))))
        .collect();

    let mut seed_results = Vec::new();
    for result in results {
        match result {
            Ok(seed_result) => seed_results.push(seed_result),
            Err(err) => eprintln!("Seed failed: {err:#}"),
        }
    }
    if seed_results.is_empty() {
        anyhow::bail!("all seeds failed");
    }

    let runs: Vec<(u64, &run_result::SummaryMetrics)> =
        seed_results.iter().map(|r| (r.seed, &r.summary)).collect();
    let stats = summary::compute_summary(&runs);
    summary::print_summary(&scenario.name, scenario.cycles, &stats);

    let batch_id = Uuid::new_v4().to_string();
    let run_ids: Vec<&str> = seed_results.iter().map(|r| r.run_id.as_str()).collect();
    let summary_doc = serde_json::json!({
        "batch_schema_version": 1,
        "batch_id": batch_id,
        "scenario_name": scenario.name,
        "scenario_params": scenario_params,
        "run_ids": run_ids,
        "stats": stats,
    });

    let summary_path = run_dir.join("summary.json");
    let summary_tmp = summary_path.with_extension("json.tmp");
    let summary_json =
        serde_json::to_string_pretty(&summary_doc).context("serializing summary")?;
    let mut summary_file = std::fs::File::create(&summary_tmp)
        .with_context(|| format!("creating {}", summary_tmp.display()))?;
    summary_file
        .write_all(summary_json.as_bytes())
        .context("writing summary")?;
    summary_file.sync_all()?;
    std::fs::rename(&summary_tmp, &summary_path).context("renaming summary")?;

    println!("Summary written to {}", summary_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            scenario,
            output_dir,
        } => run(&scenario, &output_dir)?,
    }
    Ok(())
}
