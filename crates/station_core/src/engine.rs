use crate::fault_clock::{latch_faulty_time, FaultClock};
use crate::pressure::PressureModel;
use crate::random::NormalSource;
use crate::scheduler::{CycleScheduler, PendingCycle};
use crate::{
    Command, Counters, CycleOutcome, Event, EventEnvelope, ReleaseTrigger, StationConfig,
    StationError, StationMetrics, StationStatus,
};

/// Power multiplier for running at `ideal_ms` instead of `default_ms`.
///
/// `(1/e) * 1/exp(-default/ideal)`, written as `exp(default/ideal - 1)`. Exactly
/// 1.0 at the default, growing exponentially as the ideal cycle time shrinks.
pub fn cycle_time_modifier(default_ms: u64, ideal_ms: u64) -> f64 {
    debug_assert!(ideal_ms > 0, "ideal cycle time must be floored before use");
    let ratio = default_ms as f64 / ideal_ms as f64;
    (ratio - 1.0).exp()
}

/// Energy in kWh for a cycle, assuming the station draws power for all of it.
pub fn energy_consumption_kwh(power_kw: f64, cycle_time_modifier: f64, actual_ms: u64) -> f64 {
    let adjusted_power_kw = power_kw * cycle_time_modifier;
    adjusted_power_kw * (actual_ms as f64 / 1000.0) / 3600.0
}

/// `base + round(base * |z|)`: a cycle is never shorter than its base time.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // non-negative, saturating
pub fn planned_cycle_time_ms(base_ms: u64, z: f64) -> u64 {
    let extra = (base_ms as f64 * z.abs()).round();
    let extra = if extra.is_finite() { extra as u64 } else { 0 };
    base_ms.saturating_add(extra)
}

pub fn validate_config(config: &StationConfig) -> Result<(), StationError> {
    let invalid = |msg: String| Err(StationError::InvalidConfig(msg));
    let c = &config.constants;

    if config.ideal_cycle_time_default_ms < 2 {
        return invalid(format!(
            "ideal_cycle_time_default_ms must be at least 2, got {}",
            config.ideal_cycle_time_default_ms
        ));
    }
    if !config.power_consumption_kw.is_finite() || config.power_consumption_kw < 0.0 {
        return invalid(format!(
            "power_consumption_kw must be a non-negative number, got {}",
            config.power_consumption_kw
        ));
    }
    for (name, value) in [
        ("pressure_default_mbar", c.pressure_default_mbar),
        ("pressure_high_mbar", c.pressure_high_mbar),
        ("pressure_stddev_mbar", c.pressure_stddev_mbar),
        ("failure_sigma_threshold", c.failure_sigma_threshold),
        ("discard_sigma_threshold", c.discard_sigma_threshold),
        ("cycle_time_jitter_stddev", c.cycle_time_jitter_stddev),
    ] {
        if !value.is_finite() {
            return invalid(format!("{name} must be finite, got {value}"));
        }
    }
    if c.pressure_stddev_mbar < 0.0 || c.cycle_time_jitter_stddev < 0.0 {
        return invalid("standard deviations must not be negative".to_string());
    }
    if c.pressure_high_mbar <= c.pressure_default_mbar {
        return invalid(format!(
            "pressure_high_mbar ({}) must exceed pressure_default_mbar ({})",
            c.pressure_high_mbar, c.pressure_default_mbar
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Due {
    Cycle,
    PressureRelease,
}

/// One simulated station.
///
/// Every operation takes the current time in milliseconds from a monotonic
/// origin chosen by the host. Deferred work (cycle completion, automatic
/// pressure release) only happens inside [`StationEngine::advance`].
#[derive(Debug)]
pub struct StationEngine<N> {
    config: StationConfig,
    metrics: StationMetrics,
    counters: Counters,
    scheduler: CycleScheduler,
    pressure: PressureModel,
    fault_clock: FaultClock,
    normals: N,
}

impl<N: NormalSource> StationEngine<N> {
    pub fn new(config: StationConfig, normals: N, now_ms: u64) -> Result<Self, StationError> {
        validate_config(&config)?;
        Ok(Self {
            metrics: StationMetrics::new(&config),
            counters: Counters { next_event_id: 0 },
            scheduler: CycleScheduler::default(),
            pressure: PressureModel::new(now_ms),
            fault_clock: FaultClock::default(),
            normals,
            config,
        })
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    /// Consistent copy of every telemetry value.
    pub fn metrics(&self) -> StationMetrics {
        self.metrics.clone()
    }

    pub fn status(&self) -> StationStatus {
        self.metrics.status
    }

    pub fn pending_cycle(&self) -> Option<&PendingCycle> {
        self.scheduler.pending()
    }

    pub fn pressure_model(&self) -> &PressureModel {
        &self.pressure
    }

    pub fn fault_clock(&self) -> &FaultClock {
        &self.fault_clock
    }

    pub fn normals_mut(&mut self) -> &mut N {
        &mut self.normals
    }

    pub fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    /// Earliest moment at which [`StationEngine::advance`] has work to do.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        [
            self.scheduler.next_deadline_ms(),
            self.pressure.release_due_ms(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn apply(
        &mut self,
        command: &Command,
        now_ms: u64,
    ) -> Result<Vec<EventEnvelope>, StationError> {
        match command {
            Command::Execute { serial_number } => self.execute(*serial_number, now_ms),
            Command::Reset => Ok(self.reset(now_ms)),
            Command::OpenPressureReleaseValve => Ok(self.open_pressure_release_valve(now_ms)),
            Command::SetIdealCycleTime {
                ideal_cycle_time_ms,
            } => {
                self.set_ideal_cycle_time(*ideal_cycle_time_ms);
                Ok(Vec::new())
            }
        }
    }

    /// Start producing `serial_number`. Returns as soon as the cycle is scheduled.
    pub fn execute(
        &mut self,
        serial_number: u64,
        now_ms: u64,
    ) -> Result<Vec<EventEnvelope>, StationError> {
        if let Some(pending) = self.scheduler.pending() {
            return Err(StationError::CycleInProgress {
                serial_number: pending.serial_number,
            });
        }

        let mut events = Vec::new();
        self.metrics.product_serial_number = serial_number;
        self.metrics.status = StationStatus::WorkInProgress;

        let minimum = self.config.ideal_cycle_time_minimum_ms();
        let requested = self.metrics.ideal_cycle_time_ms;
        if requested < minimum {
            self.metrics.ideal_cycle_time_ms = minimum;
            self.emit(
                now_ms,
                Event::IdealCycleTimeClamped {
                    requested_ms: requested,
                    clamped_ms: minimum,
                },
                &mut events,
            );
        }

        let constants = &self.config.constants;
        let ideal = self.metrics.ideal_cycle_time_ms;
        let jitter = self.normals.sample(0.0, constants.cycle_time_jitter_stddev);
        let mut cycle_time_ms = planned_cycle_time_ms(ideal, jitter);

        let station_failure = self.normals.sample(0.0, 1.0) > constants.failure_sigma_threshold;
        if station_failure {
            // a failing station takes longer to finish the cycle
            let overrun = self.normals.sample(0.0, 1.0);
            cycle_time_ms = planned_cycle_time_ms(constants.failure_cycle_time_ms, overrun);
        }

        self.scheduler
            .schedule(PendingCycle {
                serial_number,
                started_ms: now_ms,
                due_ms: now_ms.saturating_add(cycle_time_ms),
                station_failure,
            })
            .map_err(|c| StationError::CycleInProgress {
                serial_number: c.serial_number,
            })?;

        self.emit(
            now_ms,
            Event::CycleStarted {
                serial_number,
                planned_cycle_time_ms: cycle_time_ms,
                station_failure,
            },
            &mut events,
        );

        latch_faulty_time(&mut self.fault_clock, &mut self.metrics, now_ms);
        Ok(events)
    }

    /// Return to `Ready`, abandoning any cycle in flight.
    pub fn reset(&mut self, now_ms: u64) -> Vec<EventEnvelope> {
        let mut events = Vec::new();
        self.scheduler.cancel();
        self.fault_clock.stop(now_ms);
        self.metrics.status = StationStatus::Ready;
        latch_faulty_time(&mut self.fault_clock, &mut self.metrics, now_ms);
        self.emit(
            now_ms,
            Event::StationReset {
                faulty_time_ms: self.metrics.faulty_time_ms,
            },
            &mut events,
        );
        events
    }

    pub fn open_pressure_release_valve(&mut self, now_ms: u64) -> Vec<EventEnvelope> {
        let mut events = Vec::new();
        self.metrics.pressure_mbar = self.pressure.release(now_ms, &self.config.constants);
        self.emit(
            now_ms,
            Event::PressureReleased {
                trigger: ReleaseTrigger::Valve,
            },
            &mut events,
        );
        events
    }

    /// Takes effect from the next cycle; values below the floor are clamped then.
    pub fn set_ideal_cycle_time(&mut self, ideal_cycle_time_ms: u64) {
        self.metrics.ideal_cycle_time_ms = ideal_cycle_time_ms;
    }

    /// Fire every deferred task due at or before `now_ms`, oldest first.
    ///
    /// Each task runs at its own deadline, so late callers see the same result
    /// as punctual ones.
    pub fn advance(&mut self, now_ms: u64) -> Vec<EventEnvelope> {
        let mut events = Vec::new();
        loop {
            let next = [
                self.scheduler
                    .next_deadline_ms()
                    .map(|due| (due, Due::Cycle)),
                self.pressure
                    .release_due_ms()
                    .map(|due| (due, Due::PressureRelease)),
            ]
            .into_iter()
            .flatten()
            .filter(|(due, _)| *due <= now_ms)
            .min();

            let Some((due_ms, kind)) = next else {
                break;
            };
            match kind {
                Due::Cycle => {
                    if let Some(cycle) = self.scheduler.take_due(due_ms) {
                        self.complete_cycle(&cycle, due_ms, &mut events);
                    }
                }
                Due::PressureRelease => {
                    if self.pressure.take_due_release(due_ms) {
                        self.metrics.pressure_mbar =
                            self.pressure.release(due_ms, &self.config.constants);
                        self.emit(
                            due_ms,
                            Event::PressureReleased {
                                trigger: ReleaseTrigger::Timer,
                            },
                            &mut events,
                        );
                    }
                }
            }
        }
        events
    }

    fn complete_cycle(&mut self, cycle: &PendingCycle, now_ms: u64, events: &mut Vec<EventEnvelope>) {
        let constants = &self.config.constants;
        let product_discarded = !cycle.station_failure
            && self.normals.sample(0.0, 1.0) > constants.discard_sigma_threshold;
        let outcome = if cycle.station_failure {
            CycleOutcome::Fault
        } else if product_discarded {
            CycleOutcome::Discarded
        } else {
            CycleOutcome::Done
        };

        // Derived values first: the status must never advance ahead of them.
        let actual_cycle_time_ms = now_ms.saturating_sub(cycle.started_ms);
        let ideal = self
            .metrics
            .ideal_cycle_time_ms
            .max(self.config.ideal_cycle_time_minimum_ms());
        let modifier = cycle_time_modifier(self.config.ideal_cycle_time_default_ms, ideal);
        let energy_kwh =
            energy_consumption_kwh(self.config.power_consumption_kw, modifier, actual_cycle_time_ms);
        self.metrics.actual_cycle_time_ms = actual_cycle_time_ms;
        self.metrics.energy_consumption_kwh = energy_kwh;

        let step = self.pressure.step(
            self.metrics.pressure_mbar,
            modifier,
            now_ms,
            self.config.generate_alerts,
            &self.config.constants,
            &mut self.normals,
        );
        self.metrics.pressure_mbar = step.pressure_mbar;
        if let Some(release_at_ms) = step.release_armed_at_ms {
            self.emit(
                now_ms,
                Event::HighPressureTimerArmed { release_at_ms },
                events,
            );
        }

        match outcome {
            CycleOutcome::Fault => {
                self.metrics.number_of_discarded_products += 1;
                self.fault_clock.start(now_ms);
            }
            CycleOutcome::Discarded => self.metrics.number_of_discarded_products += 1,
            CycleOutcome::Done => self.metrics.number_of_manufactured_products += 1,
        }
        self.metrics.status = outcome.status();

        self.emit(
            now_ms,
            Event::CycleCompleted {
                serial_number: cycle.serial_number,
                outcome,
                actual_cycle_time_ms,
                energy_consumption_kwh: energy_kwh,
                pressure_mbar: step.pressure_mbar,
            },
            events,
        );

        latch_faulty_time(&mut self.fault_clock, &mut self.metrics, now_ms);
    }

    fn emit(&mut self, at_ms: u64, event: Event, events: &mut Vec<EventEnvelope>) {
        events.push(crate::emit(&mut self.counters, at_ms, event));
    }
}
