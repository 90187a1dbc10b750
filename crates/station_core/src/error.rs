use thiserror::Error;

/// Misuse of the station; simulated faults are reported as status, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StationError {
    #[error("cycle for product #{serial_number} is still in progress")]
    CycleInProgress { serial_number: u64 },
    #[error("invalid station config: {0}")]
    InvalidConfig(String),
}
