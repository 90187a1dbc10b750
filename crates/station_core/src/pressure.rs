//! Vessel pressure, advanced once per completed cycle.
//!
//! Without alerts pressure is a random walk. With alerts enabled it stays calm
//! for `pressure_stable_time_ms` after the last release, then climbs until it
//! hits `pressure_high_mbar`, where it is held until released either by the
//! valve or by the high-pressure timer.

use crate::random::NormalSource;
use crate::Constants;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureStep {
    pub pressure_mbar: f64,
    /// Set when this step armed the high-pressure timer.
    pub release_armed_at_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PressureModel {
    stable_since_ms: u64,
    release_due_ms: Option<u64>,
}

impl PressureModel {
    pub fn new(now_ms: u64) -> Self {
        Self {
            stable_since_ms: now_ms,
            release_due_ms: None,
        }
    }

    pub fn stable_since_ms(&self) -> u64 {
        self.stable_since_ms
    }

    /// Deadline of the pending high-pressure timer.
    pub fn release_due_ms(&self) -> Option<u64> {
        self.release_due_ms
    }

    /// True once the stable window has run out and alerts are enabled.
    pub fn is_rising(&self, now_ms: u64, generate_alerts: bool, constants: &Constants) -> bool {
        generate_alerts && now_ms.saturating_sub(self.stable_since_ms) > constants.pressure_stable_time_ms
    }

    /// Advance pressure for a completed cycle.
    pub fn step(
        &mut self,
        current_mbar: f64,
        cycle_time_modifier: f64,
        now_ms: u64,
        generate_alerts: bool,
        constants: &Constants,
        normals: &mut impl NormalSource,
    ) -> PressureStep {
        let sample = normals.sample(
            (cycle_time_modifier - 1.0) * 100.0,
            constants.pressure_stddev_mbar,
        );

        if !self.is_rising(now_ms, generate_alerts, constants) {
            return PressureStep {
                pressure_mbar: current_mbar + sample,
                release_armed_at_ms: None,
            };
        }

        let mut pressure = current_mbar + sample.abs();
        let mut release_armed_at_ms = None;

        if pressure <= constants.pressure_default_mbar {
            pressure = constants.pressure_default_mbar + sample;
        }
        if pressure >= constants.pressure_high_mbar {
            if self.release_due_ms.is_none() && constants.pressure_high_time_ms != 0 {
                let due = now_ms.saturating_add(constants.pressure_high_time_ms);
                self.release_due_ms = Some(due);
                release_armed_at_ms = Some(due);
            }
            pressure = constants.pressure_high_mbar + sample;
        }

        PressureStep {
            pressure_mbar: pressure,
            release_armed_at_ms,
        }
    }

    /// Restart the stable window and return the pressure to apply.
    ///
    /// A pending high-pressure timer is left armed.
    pub fn release(&mut self, now_ms: u64, constants: &Constants) -> f64 {
        self.stable_since_ms = now_ms;
        constants.pressure_default_mbar
    }

    /// Disarm the high-pressure timer if it has expired. The caller applies
    /// [`PressureModel::release`] when this returns true.
    pub fn take_due_release(&mut self, now_ms: u64) -> bool {
        if self.release_due_ms.is_some_and(|due| due <= now_ms) {
            self.release_due_ms = None;
            true
        } else {
            false
        }
    }
}
