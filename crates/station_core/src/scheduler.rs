//! The single in-flight production cycle.
//!
//! A cycle is a one-shot deadline. The host decides when time has passed and
//! calls [`CycleScheduler::take_due`]; nothing here runs on its own.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCycle {
    pub serial_number: u64,
    pub started_ms: u64,
    pub due_ms: u64,
    /// Decided when the cycle started; the completion only reports it.
    pub station_failure: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CycleScheduler {
    pending: Option<PendingCycle>,
}

impl CycleScheduler {
    /// Arm a completion. Refused while another cycle is pending; the new
    /// cycle is handed back untouched.
    pub fn schedule(&mut self, cycle: PendingCycle) -> Result<(), PendingCycle> {
        if self.pending.is_some() {
            return Err(cycle);
        }
        self.pending = Some(cycle);
        Ok(())
    }

    pub fn pending(&self) -> Option<&PendingCycle> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.pending.as_ref().map(|c| c.due_ms)
    }

    /// Remove and return the pending cycle if its deadline has been reached.
    pub fn take_due(&mut self, now_ms: u64) -> Option<PendingCycle> {
        if self.pending.as_ref().is_some_and(|c| c.due_ms <= now_ms) {
            self.pending.take()
        } else {
            None
        }
    }

    pub fn cancel(&mut self) -> Option<PendingCycle> {
        self.pending.take()
    }
}
