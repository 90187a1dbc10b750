//! Station configuration and run setup shared between station_cli, station_daemon
//! and station_bench.

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use station_core::{validate_config, BoxMuller, StationConfig, StationEngine};
use std::path::{Path, PathBuf};

/// The engine every host runs: Box–Muller over a seeded ChaCha stream.
pub type SeededEngine = StationEngine<BoxMuller<ChaCha8Rng>>;

/// Command-line overrides layered on top of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    /// Ideal cycle time in whole seconds.
    pub cycle_time_s: Option<u64>,
    pub power_consumption_kw: Option<f64>,
    pub generate_alerts: Option<bool>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut StationConfig) {
        if let Some(seconds) = self.cycle_time_s {
            config.ideal_cycle_time_default_ms = seconds.saturating_mul(1000);
        }
        if let Some(power) = self.power_consumption_kw {
            config.power_consumption_kw = power;
        }
        if let Some(alerts) = self.generate_alerts {
            config.generate_alerts = alerts;
        }
    }
}

/// Loads a station config from a JSON file. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<StationConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file: {}", path.display()))?;
    let config: StationConfig = serde_json::from_str(&json)
        .with_context(|| format!("parsing config file: {}", path.display()))?;
    Ok(config)
}

/// Config file (or defaults), then overrides, then validation.
pub fn resolve_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<StationConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => StationConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).context("invalid station configuration")?;
    Ok(config)
}

pub fn build_engine(config: StationConfig, seed: u64, start_ms: u64) -> Result<SeededEngine> {
    let normals = BoxMuller::new(ChaCha8Rng::seed_from_u64(seed));
    StationEngine::new(config, normals, start_ms).context("building station engine")
}

/// Human-readable description of the simulation settings, one line each.
pub fn settings_summary(config: &StationConfig) -> Vec<String> {
    vec![
        format!(
            "Ideal cycle time of this station is {} ms",
            config.ideal_cycle_time_default_ms
        ),
        format!(
            "Power consumption when operating at ideal cycle time is {} kW",
            config.power_consumption_kw
        ),
        format!(
            "{} generating high pressure for alert simulation",
            if config.generate_alerts {
                "Periodically"
            } else {
                "Not"
            }
        ),
    ]
}

// ---------------------------------------------------------------------------
// Run directories
// ---------------------------------------------------------------------------

pub fn generate_run_id(seed: u64) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    format!("{timestamp}_seed{seed}")
}

pub fn create_run_dir(root: &Path, run_id: &str) -> Result<PathBuf> {
    let dir = root.join(run_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating run directory: {}", dir.display()))?;
    Ok(dir)
}

/// Metadata written next to a run's metrics as `run_info.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub seed: u64,
    pub runner: String,
    pub cycles: u64,
    pub config: StationConfig,
}

pub fn write_run_info(dir: &Path, info: &RunInfo) -> Result<()> {
    let path = dir.join("run_info.json");
    let file =
        std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, info)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
