//! Time-series rows sampled from `StationMetrics`, and CSV output for them.
//!
//! `MetricsRow::sample` copies the telemetry at one instant. The writers are
//! the only IO in this crate and only touch the files they are handed.

use crate::{StationMetrics, StationStatus};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current schema version. Bump when fields are added/removed/reordered.
const METRICS_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRow {
    pub at_ms: u64,
    pub metrics_version: u32,
    pub status: StationStatus,
    pub product_serial_number: u64,
    pub number_of_manufactured_products: u64,
    pub number_of_discarded_products: u64,
    pub overall_running_time_ms: u64,
    pub faulty_time_ms: u64,
    pub energy_consumption_kwh: f64,
    pub pressure_mbar: f64,
    pub ideal_cycle_time_ms: u64,
    pub actual_cycle_time_ms: u64,
}

impl MetricsRow {
    pub fn sample(at_ms: u64, metrics: &StationMetrics) -> Self {
        Self {
            at_ms,
            metrics_version: METRICS_VERSION,
            status: metrics.status,
            product_serial_number: metrics.product_serial_number,
            number_of_manufactured_products: metrics.number_of_manufactured_products,
            number_of_discarded_products: metrics.number_of_discarded_products,
            overall_running_time_ms: metrics.overall_running_time_ms,
            faulty_time_ms: metrics.faulty_time_ms,
            energy_consumption_kwh: metrics.energy_consumption_kwh,
            pressure_mbar: metrics.pressure_mbar,
            ideal_cycle_time_ms: metrics.ideal_cycle_time_ms,
            actual_cycle_time_ms: metrics.actual_cycle_time_ms,
        }
    }
}

/// Write the CSV header row for metrics.
pub fn write_metrics_header(writer: &mut impl Write) -> std::io::Result<()> {
    writeln!(
        writer,
        "at_ms,metrics_version,status,product_serial_number,\
         number_of_manufactured_products,number_of_discarded_products,\
         overall_running_time_ms,faulty_time_ms,energy_consumption_kwh,pressure_mbar,\
         ideal_cycle_time_ms,actual_cycle_time_ms"
    )
}

/// Append a single metrics row as CSV.
pub fn append_metrics_row(writer: &mut impl Write, row: &MetricsRow) -> std::io::Result<()> {
    writeln!(
        writer,
        "{},{},{},{},{},{},{},{},{},{},{},{}",
        row.at_ms,
        row.metrics_version,
        row.status.code(),
        row.product_serial_number,
        row.number_of_manufactured_products,
        row.number_of_discarded_products,
        row.overall_running_time_ms,
        row.faulty_time_ms,
        row.energy_consumption_kwh,
        row.pressure_mbar,
        row.ideal_cycle_time_ms,
        row.actual_cycle_time_ms,
    )
}

/// Write a collection of rows to a CSV file.
pub fn write_metrics_csv(path: &Path, rows: &[MetricsRow]) -> std::io::Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_metrics_header(&mut file)?;
    for row in rows {
        append_metrics_row(&mut file, row)?;
    }
    file.flush()
}

/// Maximum data rows per CSV file before rotating to a new file.
const MAX_ROWS_PER_FILE: usize = 50_000;

/// Rotating metrics CSV writer. Splits into numbered files
/// (`metrics_000.csv`, `metrics_001.csv`, ...) after [`MAX_ROWS_PER_FILE`] rows each.
pub struct MetricsFileWriter {
    run_dir: PathBuf,
    file_index: u32,
    rows_in_current_file: usize,
    max_rows_per_file: usize,
    writer: std::io::BufWriter<std::fs::File>,
}

impl MetricsFileWriter {
    /// Create a new writer, opening the first CSV file with a header row.
    pub fn new(run_dir: PathBuf) -> std::io::Result<Self> {
        Self::with_max_rows(run_dir, MAX_ROWS_PER_FILE)
    }

    pub fn with_max_rows(run_dir: PathBuf, max_rows_per_file: usize) -> std::io::Result<Self> {
        let writer = open_csv_file(&run_dir, 0)?;
        Ok(Self {
            run_dir,
            file_index: 0,
            rows_in_current_file: 0,
            max_rows_per_file: max_rows_per_file.max(1),
            writer,
        })
    }

    /// Append one row, rotating to a new file if the current one is full.
    pub fn write_row(&mut self, row: &MetricsRow) -> std::io::Result<()> {
        if self.rows_in_current_file >= self.max_rows_per_file {
            self.writer.flush()?;
            self.file_index += 1;
            self.writer = open_csv_file(&self.run_dir, self.file_index)?;
            self.rows_in_current_file = 0;
        }
        append_metrics_row(&mut self.writer, row)?;
        self.rows_in_current_file += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

fn open_csv_file(run_dir: &Path, index: u32) -> std::io::Result<std::io::BufWriter<std::fs::File>> {
    let path = run_dir.join(format!("metrics_{index:03}.csv"));
    let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_metrics_header(&mut writer)?;
    Ok(writer)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
