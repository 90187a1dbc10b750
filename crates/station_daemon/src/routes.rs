use crate::scheduler_loop::log_events;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        Json,
    },
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use station_core::{Command, EventEnvelope, MetricsRow, StationError};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[cfg(test)]
pub fn make_router(state: AppState) -> Router {
    make_router_with_cors(state, HeaderValue::from_static("http://localhost:5173"))
}

pub fn make_router_with_cors(state: AppState, cors_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/meta", get(meta_handler))
        .route("/api/v1/metrics", get(metrics_handler))
        .route("/api/v1/metrics/history", get(metrics_history_handler))
        .route("/api/v1/execute", post(execute_handler))
        .route("/api/v1/reset", post(reset_handler))
        .route(
            "/api/v1/open-pressure-release-valve",
            post(open_valve_handler),
        )
        .route("/api/v1/ideal-cycle-time", put(ideal_cycle_time_handler))
        .route("/api/v1/stream", get(stream_handler))
        .route("/api/v1/alerts", get(alerts_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub serial_number: u64,
}

#[derive(Debug, Deserialize)]
pub struct IdealCycleTimeRequest {
    pub ideal_cycle_time_ms: u64,
}

/// Applies `command` at the current time, publishes whatever happened and
/// pokes the scheduler. Returns the engine's verdict on the command itself.
fn dispatch(app: &AppState, command: &Command) -> Result<Vec<EventEnvelope>, StationError> {
    let (events, result) = {
        let mut station = app.station.lock();
        station.apply(command, app.clock.now_ms())
    };
    if !events.is_empty() {
        log_events(&events);
        let _ = app.event_tx.send(events.clone());
    }
    app.wake.notify_one();
    result.map(|()| events)
}

pub async fn meta_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let now_ms = app_state.clock.now_ms();
    let station = app_state.station.lock();
    Json(serde_json::json!({
        "now_ms": now_ms,
        "seed": station.seed,
        "status": station.engine.status().label(),
        "config": station.engine.config(),
        "cycle_due_ms": station.engine.pending_cycle().map(|c| c.due_ms),
        "next_deadline_ms": station.engine.next_deadline_ms(),
        "operator": station.operator.is_some(),
    }))
}

pub async fn metrics_handler(State(app_state): State<AppState>) -> Json<MetricsRow> {
    let now_ms = app_state.clock.now_ms();
    let station = app_state.station.lock();
    Json(MetricsRow::sample(now_ms, &station.engine.metrics()))
}

pub async fn metrics_history_handler(State(app_state): State<AppState>) -> Json<Vec<MetricsRow>> {
    let station = app_state.station.lock();
    Json(station.metrics_history.iter().cloned().collect())
}

pub async fn execute_handler(
    State(app_state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let command = Command::Execute {
        serial_number: request.serial_number,
    };
    match dispatch(&app_state, &command) {
        Ok(events) => {
            let due_ms = cycle_due_ms(&events);
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "serial_number": request.serial_number,
                    "due_ms": due_ms,
                })),
            )
        }
        Err(err @ StationError::CycleInProgress { .. }) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": err.to_string()})),
        ),
        Err(err) => {
            tracing::error!("execute failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": err.to_string()})),
            )
        }
    }
}

/// Deadline of the cycle started by `events`. Read from the events rather
/// than the engine, which may already have completed the cycle.
fn cycle_due_ms(events: &[EventEnvelope]) -> Option<u64> {
    events.iter().find_map(|e| match e.event {
        station_core::Event::CycleStarted {
            planned_cycle_time_ms,
            ..
        } => Some(e.at_ms.saturating_add(planned_cycle_time_ms)),
        _ => None,
    })
}

pub async fn reset_handler(State(app_state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    command_response(&app_state, &Command::Reset)
}

pub async fn open_valve_handler(
    State(app_state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    command_response(&app_state, &Command::OpenPressureReleaseValve)
}

pub async fn ideal_cycle_time_handler(
    State(app_state): State<AppState>,
    Json(request): Json<IdealCycleTimeRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    command_response(
        &app_state,
        &Command::SetIdealCycleTime {
            ideal_cycle_time_ms: request.ideal_cycle_time_ms,
        },
    )
}

/// Commands that cannot be rejected: answer with the resulting telemetry.
fn command_response(app_state: &AppState, command: &Command) -> (StatusCode, Json<serde_json::Value>) {
    match dispatch(app_state, command) {
        Ok(_) => {
            let now_ms = app_state.clock.now_ms();
            let metrics = app_state.station.lock().engine.metrics();
            (
                StatusCode::OK,
                Json(serde_json::json!(MetricsRow::sample(now_ms, &metrics))),
            )
        }
        Err(err) => {
            tracing::error!(?command, "command failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": err.to_string()})),
            )
        }
    }
}

async fn alerts_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let station = app_state.station.lock();
    let active_ids = station.alert_engine.active_alert_ids();
    Json(serde_json::json!({ "active_alerts": active_ids }))
}

pub async fn stream_handler(
    State(app_state): State<AppState>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = app_state.event_tx.subscribe();
    let station = app_state.station.clone();
    let clock = app_state.clock;

    let stream = async_stream::stream! {
        let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
        heartbeat.tick().await; // discard the immediate first tick
        let mut flush = tokio::time::interval(Duration::from_millis(50));
        flush.tick().await; // discard the immediate first tick
        let mut pending: Vec<EventEnvelope> = Vec::new();
        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(events) => pending.extend(events),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "event stream subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = flush.tick() => {
                    if !pending.is_empty() {
                        let data = serde_json::to_string(&pending).unwrap_or_default();
                        pending.clear();
                        yield Ok(Event::default().data(data));
                    }
                }
                _ = heartbeat.tick() => {
                    let status = station.lock().engine.status();
                    let hb = serde_json::json!({
                        "heartbeat": true,
                        "now_ms": clock.now_ms(),
                        "status": status.label(),
                    });
                    yield Ok(Event::default().data(hb.to_string()));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}
