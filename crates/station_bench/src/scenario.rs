use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use station_control::OperatorPolicy;
use station_world::ConfigOverrides;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Finished parts (good, discarded or faulted) per seed.
    pub cycles: u64,
    pub seeds: SeedSpec,
    /// Station config JSON, resolved relative to the working directory.
    #[serde(default)]
    pub config: Option<PathBuf>,
    #[serde(default)]
    pub overrides: ConfigOverrides,
    #[serde(default)]
    pub operator: OperatorPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedSpec {
    List(Vec<u64>),
    Range { range: [u64; 2] },
}

impl SeedSpec {
    pub fn expand(&self) -> Vec<u64> {
        match self {
            SeedSpec::List(seeds) => seeds.clone(),
            SeedSpec::Range { range } => (range[0]..=range[1]).collect(),
        }
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario file: {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&json)
        .with_context(|| format!("parsing scenario file: {}", path.display()))?;
    if scenario.name.is_empty() {
        bail!("scenario 'name' must not be empty");
    }
    if scenario.cycles == 0 {
        bail!("scenario 'cycles' must be > 0");
    }
    if scenario.seeds.expand().is_empty() {
        bail!("scenario 'seeds' must produce at least one seed");
    }
    Ok(scenario)
}
