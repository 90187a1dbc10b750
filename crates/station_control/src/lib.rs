use serde::{Deserialize, Serialize};
use station_core::{
    Command, EventEnvelope, NormalSource, StationConfig, StationEngine, StationError,
    StationMetrics, StationStatus,
};

pub trait CommandSource {
    fn generate_commands(
        &mut self,
        metrics: &StationMetrics,
        config: &StationConfig,
        now_ms: u64,
    ) -> Vec<Command>;

    /// Time at which the source wants to be polled again even if the station
    /// itself has nothing scheduled.
    fn next_wake_ms(&self) -> Option<u64> {
        None
    }
}

/// How the automatic operator runs the station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorPolicy {
    /// How long a faulted station sits before the operator resets it.
    pub fault_repair_ms: u64,
    pub release_valve_at_high_pressure: bool,
    pub first_serial_number: u64,
}

impl Default for OperatorPolicy {
    fn default() -> Self {
        Self {
            fault_repair_ms: 30_000,
            release_valve_at_high_pressure: true,
            first_serial_number: 1,
        }
    }
}

/// Drives the station the way a line operator would:
/// 1. Open the release valve once pressure reaches the high threshold (if enabled).
/// 2. Leave a faulted station alone for `fault_repair_ms`, then reset it.
/// 3. Start the next serial number whenever the station is idle.
#[derive(Debug, Clone)]
pub struct OperatorController {
    policy: OperatorPolicy,
    next_serial_number: u64,
    fault_seen_at_ms: Option<u64>,
}

impl OperatorController {
    pub fn new(policy: OperatorPolicy) -> Self {
        Self {
            next_serial_number: policy.first_serial_number,
            policy,
            fault_seen_at_ms: None,
        }
    }

    pub fn policy(&self) -> &OperatorPolicy {
        &self.policy
    }

    pub fn next_serial_number(&self) -> u64 {
        self.next_serial_number
    }

    fn execute_next(&mut self, commands: &mut Vec<Command>) {
        commands.push(Command::Execute {
            serial_number: self.next_serial_number,
        });
        self.next_serial_number += 1;
    }
}

impl Default for OperatorController {
    fn default() -> Self {
        Self::new(OperatorPolicy::default())
    }
}

impl CommandSource for OperatorController {
    fn generate_commands(
        &mut self,
        metrics: &StationMetrics,
        config: &StationConfig,
        now_ms: u64,
    ) -> Vec<Command> {
        let mut commands = Vec::new();

        if self.policy.release_valve_at_high_pressure
            && metrics.pressure_mbar >= config.constants.pressure_high_mbar
        {
            commands.push(Command::OpenPressureReleaseValve);
        }

        match metrics.status {
            StationStatus::WorkInProgress => {}
            StationStatus::Fault => {
                let seen_at = *self.fault_seen_at_ms.get_or_insert(now_ms);
                if now_ms >= seen_at.saturating_add(self.policy.fault_repair_ms) {
                    self.fault_seen_at_ms = None;
                    commands.push(Command::Reset);
                    self.execute_next(&mut commands);
                }
            }
            StationStatus::Ready | StationStatus::Done | StationStatus::Discarded => {
                self.fault_seen_at_ms = None;
                self.execute_next(&mut commands);
            }
        }
        commands
    }

    fn next_wake_ms(&self) -> Option<u64> {
        self.fault_seen_at_ms
            .map(|seen_at| seen_at.saturating_add(self.policy.fault_repair_ms))
    }
}

// ---------------------------------------------------------------------------
// Virtual-time driver
// ---------------------------------------------------------------------------

/// Runs an engine and a command source on virtual time, jumping straight to
/// the next instant anything happens.
pub struct Driver<N, C> {
    engine: StationEngine<N>,
    source: C,
    now_ms: u64,
}

impl<N: NormalSource, C: CommandSource> Driver<N, C> {
    pub fn new(engine: StationEngine<N>, source: C, start_ms: u64) -> Self {
        Self {
            engine,
            source,
            now_ms: start_ms,
        }
    }

    pub fn engine(&self) -> &StationEngine<N> {
        &self.engine
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn into_parts(self) -> (StationEngine<N>, C) {
        (self.engine, self.source)
    }

    /// Apply whatever the source asks for now, then move time forward to the
    /// next deadline and fire it.
    ///
    /// Returns `Ok(None)` once nothing is left to happen.
    pub fn step(&mut self) -> Result<Option<Vec<EventEnvelope>>, StationError> {
        let mut events = Vec::new();
        let commands =
            self.source
                .generate_commands(&self.engine.metrics(), self.engine.config(), self.now_ms);
        for command in &commands {
            events.extend(self.engine.apply(command, self.now_ms)?);
        }

        let next = [self.engine.next_deadline_ms(), self.source.next_wake_ms()]
            .into_iter()
            .flatten()
            .min();
        let Some(next) = next else {
            return Ok((!events.is_empty()).then_some(events));
        };

        self.now_ms = self.now_ms.max(next);
        events.extend(self.engine.advance(self.now_ms));
        Ok(Some(events))
    }

    /// Step until `total_products()` reaches `cycles` or the station stalls.
    pub fn run_cycles(
        &mut self,
        cycles: u64,
        mut on_events: impl FnMut(&StationEngine<N>, &[EventEnvelope]),
    ) -> Result<u64, StationError> {
        while self.engine.metrics().total_products() < cycles {
            let Some(events) = self.step()? else {
                break;
            };
            on_events(&self.engine, &events);
        }
        Ok(self.engine.metrics().total_products())
    }
}
