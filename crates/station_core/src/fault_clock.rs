//! Stopwatch measuring how long the station has been in `Fault`.

use crate::StationMetrics;

/// Start/stop stopwatch over caller-supplied millisecond timestamps.
///
/// Elapsed time accumulates across start/stop pairs until [`FaultClock::reset`].
#[derive(Debug, Clone, Default)]
pub struct FaultClock {
    running_since_ms: Option<u64>,
    accumulated_ms: u64,
}

impl FaultClock {
    /// Starting an already-running clock has no effect.
    pub fn start(&mut self, now_ms: u64) {
        if self.running_since_ms.is_none() {
            self.running_since_ms = Some(now_ms);
        }
    }

    pub fn stop(&mut self, now_ms: u64) {
        if let Some(since) = self.running_since_ms.take() {
            self.accumulated_ms += now_ms.saturating_sub(since);
        }
    }

    /// Stops the clock and zeroes the elapsed time.
    pub fn reset(&mut self) {
        self.running_since_ms = None;
        self.accumulated_ms = 0;
    }

    pub fn is_running(&self) -> bool {
        self.running_since_ms.is_some()
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        let running = self
            .running_since_ms
            .map_or(0, |since| now_ms.saturating_sub(since));
        self.accumulated_ms + running
    }
}

/// Latch the last finished fault episode into `faulty_time_ms`.
///
/// Only a stopped clock is read. A non-zero reading is zeroed afterwards, so the
/// next pass over the still-stopped clock writes 0 back.
pub(crate) fn latch_faulty_time(clock: &mut FaultClock, metrics: &mut StationMetrics, now_ms: u64) {
    if clock.is_running() {
        return;
    }
    let elapsed = clock.elapsed_ms(now_ms);
    metrics.faulty_time_ms = elapsed;
    if elapsed != 0 {
        clock.reset();
    }
}
