use crate::run_result::SummaryMetrics;
use serde::Serialize;

type Extractor = (&'static str, fn(&SummaryMetrics) -> f64);

const EXTRACTORS: &[Extractor] = &[
    ("cycles_completed", |s| s.cycles_completed as f64),
    ("manufactured", |s| s.manufactured as f64),
    ("discarded", |s| s.discarded as f64),
    ("faults", |s| s.faults as f64),
    ("total_faulty_time_ms", |s| s.total_faulty_time_ms as f64),
    ("total_energy_kwh", |s| s.total_energy_kwh),
    ("mean_cycle_time_ms", |s| s.mean_cycle_time_ms),
    ("max_pressure_mbar", |s| s.max_pressure_mbar),
    ("valve_releases", |s| s.valve_releases as f64),
    ("timer_releases", |s| s.timer_releases as f64),
    ("failure_rate", |s| s.failure_rate),
    ("discard_rate", |s| s.discard_rate),
];

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub seed_count: usize,
    pub total_cycles: u64,
    /// Faults over all cycles of all seeds.
    pub pooled_failure_rate: f64,
    pub pooled_discard_rate: f64,
    pub metrics: Vec<MetricSummary>,
}

#[derive(Debug, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

pub fn compute_summary(runs: &[(u64, &SummaryMetrics)]) -> SummaryStats {
    let total_cycles: u64 = runs.iter().map(|(_, s)| s.cycles_completed).sum();
    let total_faults: u64 = runs.iter().map(|(_, s)| s.faults).sum();
    let total_discarded: u64 = runs.iter().map(|(_, s)| s.discarded).sum();
    let pooled = |count: u64| {
        if total_cycles == 0 {
            0.0
        } else {
            count as f64 / total_cycles as f64
        }
    };

    let metrics = EXTRACTORS
        .iter()
        .map(|(name, extract)| {
            let values: Vec<f64> = runs.iter().map(|(_, s)| extract(s)).collect();
            compute_metric_summary(name, &values)
        })
        .collect();

    SummaryStats {
        seed_count: runs.len(),
        total_cycles,
        pooled_failure_rate: pooled(total_faults),
        pooled_discard_rate: pooled(total_discarded),
        metrics,
    }
}

fn compute_metric_summary(name: &str, values: &[f64]) -> MetricSummary {
    if values.is_empty() {
        return MetricSummary {
            name: name.to_string(),
            mean: 0.0,
            min: 0.0,
            max: 0.0,
            stddev: 0.0,
        };
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

    MetricSummary {
        name: name.to_string(),
        mean,
        min,
        max,
        stddev: variance.sqrt(),
    }
}

pub fn print_summary(scenario_name: &str, cycles: u64, stats: &SummaryStats) {
    println!(
        "\n=== {} ({} seeds, {} cycles each) ===\n",
        scenario_name, stats.seed_count, cycles
    );
    println!(
        "{:<24} {:>12} {:>12} {:>12} {:>12}",
        "Metric", "Mean", "Min", "Max", "StdDev"
    );
    println!("{}", "-".repeat(76));
    for metric in &stats.metrics {
        println!(
            "{:<24} {:>12.4} {:>12.4} {:>12.4} {:>12.4}",
            metric.name, metric.mean, metric.min, metric.max, metric.stddev
        );
    }
    println!(
        "{:<24} {:.5} over {} cycles",
        "pooled_failure_rate", stats.pooled_failure_rate, stats.total_cycles
    );
    println!(
        "{:<24} {:.5} over {} cycles",
        "pooled_discard_rate", stats.pooled_discard_rate, stats.total_cycles
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(cycles: u64, faults: u64, discarded: u64, energy: f64) -> SummaryMetrics {
        SummaryMetrics {
            cycles_completed: cycles,
            manufactured: cycles - faults - discarded,
            discarded,
            faults,
            total_energy_kwh: energy,
            failure_rate: faults as f64 / cycles as f64,
            discard_rate: discarded as f64 / cycles as f64,
            ..SummaryMetrics::default()
        }
    }

    fn metric<'a>(stats: &'a SummaryStats, name: &str) -> &'a MetricSummary {
        stats.metrics.iter().find(|m| m.name == name).unwrap()
    }

    #[test]
    fn test_summary_basic_stats() {
        let a = run(100, 0, 2, 20.0);
        let b = run(100, 2, 4, 30.0);
        let stats = compute_summary(&[(1, &a), (2, &b)]);

        assert_eq!(stats.seed_count, 2);
        assert_eq!(stats.total_cycles, 200);

        let energy = metric(&stats, "total_energy_kwh");
        assert!((energy.mean - 25.0).abs() < 1e-9);
        assert!((energy.min - 20.0).abs() < 1e-9);
        assert!((energy.max - 30.0).abs() < 1e-9);
        assert!((energy.stddev - 5.0).abs() < 1e-9);

        let discarded = metric(&stats, "discarded");
        assert!((discarded.mean - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_pooled_rates_weight_by_cycles() {
        let a = run(100, 1, 0, 0.0);
        let b = run(300, 0, 12, 0.0);
        let stats = compute_summary(&[(1, &a), (2, &b)]);
        assert!((stats.pooled_failure_rate - 1.0 / 400.0).abs() < 1e-12);
        assert!((stats.pooled_discard_rate - 12.0 / 400.0).abs() < 1e-12);
        // the per-seed mean is unweighted
        assert!((metric(&stats, "failure_rate").mean - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_summary_single_seed_has_zero_stddev() {
        let a = run(50, 1, 1, 12.5);
        let stats = compute_summary(&[(9, &a)]);
        assert!(stats.metrics.iter().all(|m| m.stddev.abs() < 1e-12));
    }

    #[test]
    fn test_summary_without_runs() {
        let stats = compute_summary(&[]);
        assert_eq!(stats.seed_count, 0);
        assert!(stats.pooled_failure_rate.abs() < f64::EPSILON);
        assert!(stats.metrics.iter().all(|m| m.mean.abs() < f64::EPSILON));
    }
}
