use crate::alerts::AlertEngine;
use parking_lot::Mutex;
use station_control::{CommandSource, OperatorController};
use station_core::{Command, Event, EventEnvelope, MetricsRow, StationError};
use station_world::SeededEngine;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;

/// Rows kept for `/api/v1/metrics/history` and alert evaluation.
const METRICS_HISTORY_CAP: usize = 1_000;

pub struct StationState {
    pub engine: SeededEngine,
    pub alert_engine: AlertEngine,
    pub operator: Option<OperatorController>,
    pub metrics_history: VecDeque<MetricsRow>,
    pub seed: u64,
}

impl StationState {
    pub fn new(engine: SeededEngine, operator: Option<OperatorController>, seed: u64) -> Self {
        let alert_engine = AlertEngine::new(engine.config().constants.pressure_high_mbar);
        Self {
            engine,
            alert_engine,
            operator,
            metrics_history: VecDeque::new(),
            seed,
        }
    }

    /// Fire due work, then apply `command`. The command only fails if the
    /// engine rejects it; due work has already been recorded by then.
    pub fn apply(
        &mut self,
        command: &Command,
        now_ms: u64,
    ) -> (Vec<EventEnvelope>, Result<(), StationError>) {
        let mut events = self.engine.advance(now_ms);
        let result = self
            .engine
            .apply(command, now_ms)
            .map(|applied| events.extend(applied));
        self.record(&mut events, now_ms);
        (events, result)
    }

    /// Fire due work and let the operator (if any) react to it.
    pub fn step(&mut self, now_ms: u64) -> Vec<EventEnvelope> {
        let mut events = self.engine.advance(now_ms);
        if let Some(operator) = self.operator.as_mut() {
            let commands =
                operator.generate_commands(&self.engine.metrics(), self.engine.config(), now_ms);
            for command in &commands {
                match self.engine.apply(command, now_ms) {
                    Ok(applied) => events.extend(applied),
                    Err(err) => tracing::warn!(?command, "operator command rejected: {err}"),
                }
            }
        }
        self.record(&mut events, now_ms);
        events
    }

    /// Next instant the scheduler must wake up for.
    pub fn next_wake_ms(&self) -> Option<u64> {
        let operator_wake = self
            .operator
            .as_ref()
            .and_then(OperatorController::next_wake_ms);
        [self.engine.next_deadline_ms(), operator_wake]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn push_metrics(&mut self, row: MetricsRow) {
        if self.metrics_history.len() >= METRICS_HISTORY_CAP {
            self.metrics_history.pop_front();
        }
        self.metrics_history.push_back(row);
    }

    /// Sample telemetry after any event that changed it and re-run the alert rules.
    fn record(&mut self, events: &mut Vec<EventEnvelope>, now_ms: u64) {
        let telemetry_changed = events.iter().any(|e| {
            matches!(
                e.event,
                Event::CycleCompleted { .. }
                    | Event::StationReset { .. }
                    | Event::PressureReleased { .. }
            )
        });
        if !telemetry_changed {
            return;
        }
        self.push_metrics(MetricsRow::sample(now_ms, &self.engine.metrics()));
        let alert_events = self.alert_engine.evaluate(
            &self.metrics_history,
            now_ms,
            self.engine.counters_mut(),
        );
        events.extend(alert_events);
    }
}

/// Maps the daemon's monotonic clock onto engine milliseconds.
///
/// Built on `tokio::time::Instant` so tests can pause and advance time.
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    origin: Instant,
}

impl SimClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    #[allow(clippy::cast_possible_truncation)] // u64 millis covers 500M years
    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    pub fn instant_at(&self, at_ms: u64) -> Instant {
        self.origin + Duration::from_millis(at_ms)
    }
}

pub type SharedStation = Arc<Mutex<StationState>>;
pub type EventTx = broadcast::Sender<Vec<EventEnvelope>>;

#[derive(Clone)]
pub struct AppState {
    pub station: SharedStation,
    pub event_tx: EventTx,
    /// Pokes the scheduler when a command may have moved the next deadline.
    pub wake: Arc<Notify>,
    pub clock: SimClock,
}

impl AppState {
    pub fn new(station: StationState, clock: SimClock) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            station: Arc::new(Mutex::new(station)),
            event_tx,
            wake: Arc::new(Notify::new()),
            clock,
        }
    }
}
