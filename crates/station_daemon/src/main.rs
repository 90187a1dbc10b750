mod alerts;
mod routes;
mod scheduler_loop;
mod state;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::{Parser, ValueEnum};
use station_control::{OperatorController, OperatorPolicy};
use station_world::{build_engine, resolve_config, settings_summary, ConfigOverrides};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::state::{AppState, SimClock, StationState};

#[derive(Parser, Debug)]
#[command(name = "station_daemon", about = "Manufacturing station simulation service")]
struct Cli {
    #[arg(long, default_value_t = 3001)]
    port: u16,
    /// Station config JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Random seed; a fresh one is drawn when omitted.
    #[arg(long)]
    seed: Option<u64>,
    /// Ideal cycle time in seconds.
    #[arg(long = "cycle-time")]
    cycle_time_s: Option<u64>,
    /// Power consumption in kW at the ideal cycle time.
    #[arg(long = "power-consumption")]
    power_consumption_kw: Option<f64>,
    /// Periodically drive pressure high for alert simulation.
    #[arg(long)]
    generate_alerts: bool,
    /// Run the automatic operator instead of waiting for HTTP commands.
    #[arg(long)]
    operator: bool,
    /// Seconds a faulted station waits before the operator resets it.
    #[arg(long, default_value_t = 30)]
    repair_time: u64,
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    /// Also write logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(long, default_value = "http://localhost:5173")]
    cors_origin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Verbose,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Fatal | LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_level, cli.log_file.as_deref())?;

    let overrides = ConfigOverrides {
        cycle_time_s: cli.cycle_time_s,
        power_consumption_kw: cli.power_consumption_kw,
        generate_alerts: cli.generate_alerts.then_some(true),
    };
    let config = resolve_config(cli.config.as_deref(), &overrides)?;
    let seed = cli.seed.unwrap_or_else(rand::random);
    for line in settings_summary(&config) {
        info!("{line}");
    }

    let clock = SimClock::start();
    let engine = build_engine(config, seed, clock.now_ms())?;
    let operator = cli.operator.then(|| {
        OperatorController::new(OperatorPolicy {
            fault_repair_ms: cli.repair_time.saturating_mul(1000),
            ..OperatorPolicy::default()
        })
    });
    info!(seed, operator = cli.operator, "station ready");

    let app_state = AppState::new(StationState::new(engine, operator, seed), clock);
    tokio::spawn(scheduler_loop::run_scheduler(app_state.clone()));

    let cors_origin = HeaderValue::from_str(&cli.cors_origin)
        .with_context(|| format!("invalid --cors-origin {:?}", cli.cors_origin))?;
    let app = routes::make_router_with_cors(app_state, cors_origin);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "station_daemon listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("station_daemon stopped");
    Ok(())
}

/// `RUST_LOG` wins over `--log-level` when set. The returned guard flushes
/// the file writer on drop and must live as long as the process.
fn init_tracing(level: LogLevel, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let stdout_layer = fmt::layer().with_target(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("--log-file {} has no file name", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            () = ctrl_c() => {},
            () = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => warn!(?err, "failed to install SIGTERM handler"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_map_onto_tracing_directives() {
        assert_eq!(LogLevel::Fatal.directive(), "error");
        assert_eq!(LogLevel::Warn.directive(), "warn");
        assert_eq!(LogLevel::Verbose.directive(), "trace");
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["station_daemon"]);
        assert_eq!(cli.port, 3001);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert_eq!(cli.repair_time, 30);
        assert!(!cli.operator);
    }

    #[test]
    fn cli_parses_station_overrides() {
        let cli = Cli::parse_from([
            "station_daemon",
            "--cycle-time",
            "5",
            "--power-consumption",
            "90.5",
            "--generate-alerts",
            "--log-level",
            "verbose",
        ]);
        assert_eq!(cli.cycle_time_s, Some(5));
        assert!(cli
            .power_consumption_kw
            .is_some_and(|kw| (kw - 90.5).abs() < 1e-9));
        assert!(cli.generate_alerts);
        assert_eq!(cli.log_level, LogLevel::Verbose);
    }
}
