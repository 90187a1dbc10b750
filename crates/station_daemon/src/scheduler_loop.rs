use crate::state::AppState;
use station_core::{CycleOutcome, Event, EventEnvelope};

/// Fires deferred station work on wall-clock time.
///
/// Sleeps until the next deadline, or until a command handler pokes `wake`
/// because the deadline may have moved.
pub async fn run_scheduler(app: AppState) {
    loop {
        let (events, next_wake_ms) = {
            let mut station = app.station.lock();
            let events = station.step(app.clock.now_ms());
            (events, station.next_wake_ms())
        };

        if !events.is_empty() {
            log_events(&events);
            let _ = app.event_tx.send(events);
        }

        match next_wake_ms {
            Some(at_ms) => {
                tokio::select! {
                    () = tokio::time::sleep_until(app.clock.instant_at(at_ms)) => {}
                    () = app.wake.notified() => {}
                }
            }
            None => app.wake.notified().await,
        }
    }
}

pub fn log_events(events: &[EventEnvelope]) {
    for envelope in events {
        let at_ms = envelope.at_ms;
        match &envelope.event {
            Event::CycleCompleted {
                serial_number,
                outcome: CycleOutcome::Fault,
                ..
            } => tracing::warn!(at_ms, serial_number, "station fault"),
            Event::HighPressureTimerArmed { release_at_ms } => {
                tracing::warn!(at_ms, release_at_ms, "pressure high, release timer armed");
            }
            Event::PressureReleased { trigger } => {
                tracing::info!(at_ms, ?trigger, "pressure released");
            }
            Event::StationReset { faulty_time_ms } => {
                tracing::info!(at_ms, faulty_time_ms, "station reset");
            }
            Event::AlertRaised {
                alert_id, message, ..
            } => tracing::warn!(at_ms, %alert_id, "alert raised: {message}"),
            event => tracing::debug!(at_ms, ?event, "station event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SimClock, StationState};
    use station_control::OperatorController;
    use station_core::{Command, StationConfig, StationStatus};
    use std::time::Duration;

    fn app_state(operator: Option<OperatorController>) -> AppState {
        let engine = station_world::build_engine(StationConfig::default(), 7, 0).unwrap();
        AppState::new(StationState::new(engine, operator, 7), SimClock::start())
    }

    #[tokio::test(start_paused = true)]
    async fn completes_cycle_at_deadline() {
        let app = app_state(None);
        let mut rx = app.event_tx.subscribe();
        tokio::spawn(run_scheduler(app.clone()));

        let due_ms = {
            let mut station = app.station.lock();
            let (_, result) = station.apply(&Command::Execute { serial_number: 5 }, 0);
            result.unwrap();
            station.engine.pending_cycle().unwrap().due_ms
        };
        app.wake.notify_one();

        tokio::time::sleep(Duration::from_millis(due_ms - 1)).await;
        assert_eq!(app.station.lock().engine.status(), StationStatus::WorkInProgress);

        tokio::time::sleep(Duration::from_millis(2)).await;
        let metrics = app.station.lock().engine.metrics();
        assert_ne!(metrics.status, StationStatus::WorkInProgress);
        assert_eq!(metrics.total_products(), 1);
        assert_eq!(metrics.actual_cycle_time_ms, due_ms);

        let events = rx.recv().await.unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e.event, Event::CycleCompleted { serial_number: 5, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_scheduler_waits_for_commands() {
        let app = app_state(None);
        tokio::spawn(run_scheduler(app.clone()));

        tokio::time::sleep(Duration::from_secs(600)).await;
        let station = app.station.lock();
        assert_eq!(station.engine.status(), StationStatus::Ready);
        assert!(station.metrics_history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn operator_keeps_station_busy() {
        let app = app_state(Some(OperatorController::default()));
        tokio::spawn(run_scheduler(app.clone()));

        // ten minutes at 7 s per part
        tokio::time::sleep(Duration::from_secs(600)).await;
        let station = app.station.lock();
        let produced = station.engine.metrics().total_products();
        assert!(produced > 40, "only {produced} parts in ten minutes");
        // one sample per completion, plus one per reset
        assert!(station.metrics_history.len() as u64 >= produced);
    }
}
