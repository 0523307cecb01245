//! Daylight Sync - Main Entry Point
//!
//! Runs the MQTT-driven monitor brightness service, or applies commands
//! locally for configuration checks and manual testing.

use clap::{Parser, Subcommand};
use daylight_sync::command::{
    decode, BrightnessStepper, CommandPayload, ExecutionError, ExecutionReport,
    LatestCommandSlot, MonitorCommandExecutor, Percent, StepDirection,
};
use daylight_sync::config::{ConfigError, DaylightConfig};
use daylight_sync::observability::init_default_logging;
use daylight_sync::shutdown::{self, ShutdownSignal};
use daylight_sync::transport::mqtt::configure_mqtt_options;
use daylight_sync::{ConnectionSupervisor, RumqttcSession, SyncError, SyncResult};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Instrument};

/// Configuration files tried in order when `--config` is not given
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["daylight-sync.toml", "config/daylight-sync.toml"];

/// Bounded wait for the command worker after shutdown
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Applies MQTT daylight commands to monitor brightness and contrast
#[derive(Parser)]
#[command(name = "daylight-sync")]
#[command(about = "Sync monitor brightness with daylight commands received over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and apply received commands until stopped
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration (password masked)
        #[arg(long)]
        show: bool,
    },
    /// Apply one command locally, bypassing the broker
    Apply {
        /// Brightness percent, clamped to 0..=100
        #[arg(long, allow_negative_numbers = true, required_unless_present = "payload")]
        brightness: Option<i64>,
        /// Color percent, clamped to 0..=100
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        color: i64,
        /// Raw message body as published on the topic, e.g. '{"brightness":60}'
        #[arg(long, conflicts_with = "brightness")]
        payload: Option<String>,
    },
    /// Step brightness from stdin: "+"/"up" raises it, "-"/"down" lowers it
    Step {
        /// Starting brightness percent
        #[arg(long, default_value_t = 25)]
        start: i64,
        /// Percent points per step
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(1..=100))]
        step: u8,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting daylight-sync v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_service(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Apply {
            brightness,
            color,
            payload,
        } => match command_from_args(brightness, color, payload.as_deref()) {
            Ok(command) => apply_once(&config, command).await,
            Err(e) => Err(e),
        },
        Commands::Step { start, step } => run_stepper(&config, Percent::clamped(start), step).await,
    };

    match result {
        Err(e) if !e.is_cancellation() => {
            error!("Command failed: {}", e);
            process::exit(1);
        }
        _ => info!("Application shutdown complete"),
    }
}

fn load_configuration(config_path: Option<&Path>) -> SyncResult<DaylightConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(DaylightConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(DaylightConfig::load_from_file(path)?);
        }
    }

    Err(ConfigError::InvalidConfig(format!(
        "no configuration file found; pass -c/--config or create {}",
        DEFAULT_CONFIG_PATHS[0]
    ))
    .into())
}

fn command_from_args(
    brightness: Option<i64>,
    color: i64,
    payload: Option<&str>,
) -> SyncResult<CommandPayload> {
    match payload {
        Some(raw) => Ok(decode(raw.as_bytes())?),
        None => Ok(CommandPayload::new(brightness.unwrap_or_default(), color)),
    }
}

fn executor_for(config: &DaylightConfig, shutdown: ShutdownSignal) -> MonitorCommandExecutor {
    MonitorCommandExecutor::new(
        config.executor.program.clone(),
        config.device_targets(),
        shutdown,
    )
}

async fn run_service(config: DaylightConfig) -> SyncResult<()> {
    if !config.mqtt.enabled {
        info!("MQTT client disabled in configuration, nothing to run");
        return Ok(());
    }

    let (trigger, signal) = shutdown::channel();
    let executor = Arc::new(executor_for(&config, signal.clone()));
    let slot = Arc::new(LatestCommandSlot::spawn(executor, signal.clone()));
    let supervisor = Arc::new(ConnectionSupervisor::new(
        config.broker_endpoint(),
        RumqttcSession::new(),
        slot.clone(),
    ));

    // start may block until the network comes up, so it runs beside the signal wait
    let starter = {
        let supervisor = supervisor.clone();
        let signal = signal.clone();
        tokio::spawn(async move { supervisor.start(&signal).await })
    };

    wait_for_shutdown_signal().await?;

    // a second Ctrl-C abandons the graceful disconnect
    let (force_trigger, force) = shutdown::channel();
    let force_watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt received, skipping graceful disconnect");
            force_trigger.fire();
        }
    });

    let span = daylight_sync::lifecycle_span!(phase = "shutdown");
    async {
        info!("Application shutdown initiated");
        trigger.fire();
        supervisor.stop(&force).await;
        force_watcher.abort();

        if let Err(e) = starter.await {
            if !e.is_cancelled() {
                warn!("Start task ended with error: {}", e);
            }
        }
        slot.join(WORKER_JOIN_TIMEOUT).await;
        info!(
            received = slot.submitted_count(),
            applied = slot.applied_count(),
            "Command worker stopped"
        );
    }
    .instrument(span)
    .await;

    Ok(())
}

async fn wait_for_shutdown_signal() -> SyncResult<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C, shutting down gracefully...");
    }

    Ok(())
}

fn handle_config_command(config: &DaylightConfig, show: bool) -> SyncResult<()> {
    if config.mqtt.enabled {
        configure_mqtt_options(&config.broker_endpoint())?;
    }

    if show {
        let rendered = toml::to_string_pretty(&config.redacted())
            .map_err(|e| SyncError::internal(format!("Failed to render configuration: {e}")))?;
        println!("Current configuration:");
        println!("{rendered}");
    }

    info!(
        monitors = config.monitors.len(),
        mqtt_enabled = config.mqtt.enabled,
        "Configuration validation complete"
    );
    Ok(())
}

async fn apply_once(config: &DaylightConfig, payload: CommandPayload) -> SyncResult<()> {
    let executor = executor_for(config, ShutdownSignal::never());
    info!("Applying {}", executor.command_line(&payload));

    match executor.execute(&payload).await {
        ExecutionReport::Succeeded { elapsed } => {
            info!("Command applied in {}ms", elapsed.as_millis());
            Ok(())
        }
        ExecutionReport::Skipped | ExecutionReport::Cancelled => Ok(()),
        ExecutionReport::Failed { code } => Err(ExecutionError::NonZeroExit {
            code,
            stderr: String::new(),
        }
        .into()),
        ExecutionReport::SpawnFailed => Err(SyncError::internal(format!(
            "{} could not be started",
            executor.program()
        ))),
    }
}

async fn run_stepper(config: &DaylightConfig, start: Percent, step: u8) -> SyncResult<()> {
    let (trigger, signal) = shutdown::channel();
    let executor = executor_for(config, signal);
    let mut stepper = BrightnessStepper::new(start, step);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Brightness {}. Enter + or - (up/down), Ctrl-D to quit.", stepper.current());

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Task cancelled");
                trigger.fire();
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            break;
        };
        let Some(direction) = StepDirection::parse(&line) else {
            continue;
        };
        let Some(payload) = stepper.step(direction) else {
            continue;
        };

        println!("Brightness {}", payload.brightness());
        executor.execute(&payload).await;
    }

    Ok(())
}
