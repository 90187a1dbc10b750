//! Type definitions for `station_core`.
//!
//! Configuration, the metrics record, commands and the event stream.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(EventId);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Ideal cycle time used when no configuration is supplied (7 s).
pub const IDEAL_CYCLE_TIME_DEFAULT_MS: u64 = 7 * 1000;
/// Power draw at the ideal cycle time when no configuration is supplied.
pub const POWER_CONSUMPTION_DEFAULT_KW: f64 = 150.0;

/// Per-station settings fixed at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub ideal_cycle_time_default_ms: u64,
    pub power_consumption_kw: f64,
    /// Periodically drive pressure towards the high threshold.
    pub generate_alerts: bool,
    pub constants: Constants,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            ideal_cycle_time_default_ms: IDEAL_CYCLE_TIME_DEFAULT_MS,
            power_consumption_kw: POWER_CONSUMPTION_DEFAULT_KW,
            generate_alerts: false,
            constants: Constants::default(),
        }
    }
}

impl StationConfig {
    /// Lowest ideal cycle time a cycle may run at.
    pub fn ideal_cycle_time_minimum_ms(&self) -> u64 {
        self.ideal_cycle_time_default_ms / 2
    }
}

/// Simulation tunables. Defaults reproduce the reference station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constants {
    /// Base duration of a cycle that ends in a station failure.
    pub failure_cycle_time_ms: u64,
    /// How long pressure stays calm after a release before it starts climbing.
    pub pressure_stable_time_ms: u64,
    /// How long high pressure lasts before it is released automatically. 0 disables.
    pub pressure_high_time_ms: u64,
    pub pressure_default_mbar: f64,
    pub pressure_high_mbar: f64,
    pub pressure_stddev_mbar: f64,
    /// Standard-normal draw above which the station fails (3σ ≈ 0.135%).
    pub failure_sigma_threshold: f64,
    /// Standard-normal draw above which the part is discarded (2σ ≈ 2.28%).
    pub discard_sigma_threshold: f64,
    /// Relative standard deviation of the cycle-time jitter.
    pub cycle_time_jitter_stddev: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            failure_cycle_time_ms: 5000,
            pressure_stable_time_ms: 60 * 1000,
            pressure_high_time_ms: 120 * 1000,
            pressure_default_mbar: 2500.0,
            pressure_high_mbar: 6000.0,
            pressure_stddev_mbar: 50.0,
            failure_sigma_threshold: 3.0,
            discard_sigma_threshold: 2.0,
            cycle_time_jitter_stddev: 0.1,
        }
    }
}

// ---------------------------------------------------------------------------
// Station state
// ---------------------------------------------------------------------------

/// Reported station status. Discriminants match the published telemetry codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StationStatus {
    Ready = 0,
    WorkInProgress = 1,
    Done = 2,
    Discarded = 3,
    Fault = 4,
}

impl StationStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn label(self) -> &'static str {
        match self {
            StationStatus::Ready => "ready",
            StationStatus::WorkInProgress => "work_in_progress",
            StationStatus::Done => "done",
            StationStatus::Discarded => "discarded",
            StationStatus::Fault => "fault",
        }
    }
}

impl std::fmt::Display for StationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Telemetry values published by a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMetrics {
    pub product_serial_number: u64,
    pub number_of_manufactured_products: u64,
    pub number_of_discarded_products: u64,
    /// Maintained by the host; the engine never writes it.
    pub overall_running_time_ms: u64,
    /// Length of the most recently completed fault episode.
    pub faulty_time_ms: u64,
    pub status: StationStatus,
    /// Energy used by the last completed cycle.
    pub energy_consumption_kwh: f64,
    pub pressure_mbar: f64,
    pub ideal_cycle_time_ms: u64,
    pub actual_cycle_time_ms: u64,
}

impl StationMetrics {
    pub fn new(config: &StationConfig) -> Self {
        Self {
            product_serial_number: 0,
            number_of_manufactured_products: 0,
            number_of_discarded_products: 0,
            overall_running_time_ms: 0,
            faulty_time_ms: 0,
            status: StationStatus::Ready,
            energy_consumption_kwh: 0.0,
            pressure_mbar: config.constants.pressure_default_mbar,
            ideal_cycle_time_ms: config.ideal_cycle_time_default_ms,
            actual_cycle_time_ms: config.ideal_cycle_time_default_ms,
        }
    }

    pub fn total_products(&self) -> u64 {
        self.number_of_manufactured_products + self.number_of_discarded_products
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counters {
    pub next_event_id: u64,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Operations a host may invoke on a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Execute { serial_number: u64 },
    Reset,
    OpenPressureReleaseValve,
    SetIdealCycleTime { ideal_cycle_time_ms: u64 },
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleOutcome {
    Done,
    Discarded,
    Fault,
}

impl CycleOutcome {
    pub fn status(self) -> StationStatus {
        match self {
            CycleOutcome::Done => StationStatus::Done,
            CycleOutcome::Discarded => StationStatus::Discarded,
            CycleOutcome::Fault => StationStatus::Fault,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseTrigger {
    /// An operator opened the pressure release valve.
    Valve,
    /// The high-pressure phase timed out.
    Timer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub at_ms: u64,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CycleStarted {
        serial_number: u64,
        planned_cycle_time_ms: u64,
        station_failure: bool,
    },
    IdealCycleTimeClamped {
        requested_ms: u64,
        clamped_ms: u64,
    },
    CycleCompleted {
        serial_number: u64,
        outcome: CycleOutcome,
        actual_cycle_time_ms: u64,
        energy_consumption_kwh: f64,
        pressure_mbar: f64,
    },
    StationReset {
        faulty_time_ms: u64,
    },
    HighPressureTimerArmed {
        release_at_ms: u64,
    },
    PressureReleased {
        trigger: ReleaseTrigger,
    },
    AlertRaised {
        alert_id: String,
        severity: AlertSeverity,
        message: String,
        suggested_action: String,
    },
    AlertCleared {
        alert_id: String,
    },
}
