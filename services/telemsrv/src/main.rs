//! telemsrv entry point
//!
//! Bootstrap order: CLI → configuration → logging → meter bus → network
//! link → cycle service → scheduler and API tasks. The process exits with
//! a dedicated code after provisioning so the supervisor restarts it with
//! the new credentials.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gridlink_meter::{DirectionControl, MeterClient, NoopDirection, SerialTransport, REGISTER_CATALOG};
use telemsrv::{
    api, logging, AccessPointProfile, AcquisitionEngine, AgentConfig, AgentContext,
    ConnectivityManager, CredentialStore, CycleRunner, CycleService, DeviceClock, HttpUploader,
    NetworkManagerLink, StationPolicy, UploadScheduler,
};

/// Exit code asking the supervisor to restart us with the new credentials
const RESTART_EXIT_CODE: u8 = 10;

#[derive(Parser, Debug)]
#[command(author, version, about = "Telemetry agent for the Kron Mult-K power meter")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/telemsrv.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let config = AgentConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if args.validate {
        println!("Configuration OK: {}", args.config.display());
        return Ok(ExitCode::SUCCESS);
    }

    let _log_guard = logging::init(&config.logging, args.log_level.as_deref());
    info!("Starting telemsrv v{}", env!("CARGO_PKG_VERSION"));

    run(config).await
}

async fn run(config: AgentConfig) -> anyhow::Result<ExitCode> {
    // Meter bus
    let read_timeout = Duration::from_millis(config.serial.read_timeout_ms);
    let transport =
        SerialTransport::open(&config.serial.device, config.serial.baud_rate, read_timeout)
            .context("opening the meter serial port")?;
    let client = MeterClient::new(
        transport,
        direction_control(&config)?,
        config.device.station_id,
        read_timeout,
    );

    let clock = DeviceClock::with_offset_hours(config.device.timezone_offset_hours);
    let engine = AcquisitionEngine::new(
        Box::new(client),
        REGISTER_CATALOG,
        config.device.id.clone(),
        clock,
        Duration::from_millis(config.serial.pacing_ms),
    );
    let uploader = HttpUploader::new(
        config.collector.url.clone(),
        Duration::from_secs(config.collector.timeout_secs),
    )?;
    let runner = CycleRunner::new(engine, Box::new(uploader), clock);

    // Network link
    let store = CredentialStore::new(&config.store.path);
    let mut connectivity = ConnectivityManager::new(
        Box::new(NetworkManagerLink::new(config.wifi.interface.clone())),
        AccessPointProfile {
            ssid: config.wifi.ap_ssid.clone(),
            password: config.wifi.ap_password.clone(),
        },
        StationPolicy {
            max_attempts: config.wifi.max_attempts,
            attempt_delay: Duration::from_secs(config.wifi.attempt_delay_secs),
        },
    );
    let state = connectivity.bring_up(store.load()).await;
    info!("Link state after bring-up: {:?}", state);
    let connectivity = Arc::new(RwLock::new(connectivity));

    let cycles = Arc::new(CycleService::new(runner, connectivity.clone()));
    let shutdown = CancellationToken::new();
    let restart = CancellationToken::new();

    let context = Arc::new(AgentContext::new(
        config.clone(),
        store,
        connectivity,
        cycles.clone(),
        restart.clone(),
    ));

    let scheduler = UploadScheduler::new(
        cycles,
        Duration::from_secs(config.scheduler.interval_secs),
    );
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));
    let api_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = api::serve(context, shutdown).await {
                error!("API server failed: {}", e);
            }
        }
    });

    let exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            ExitCode::SUCCESS
        }
        () = restart.cancelled() => {
            info!("Provisioning restart: exiting for the supervisor to bring us back up");
            ExitCode::from(RESTART_EXIT_CODE)
        }
    };

    shutdown.cancel();
    let _ = scheduler_task.await;
    let _ = api_task.await;
    Ok(exit)
}

/// Pick the DE/RE control for the configured adapter
fn direction_control(config: &AgentConfig) -> anyhow::Result<Box<dyn DirectionControl>> {
    match config.serial.direction_pin {
        #[cfg(all(target_os = "linux", feature = "gpio"))]
        Some(pin) => {
            let gpio = gridlink_meter::GpioDirection::new(pin).context("claiming the DE/RE pin")?;
            Ok(Box::new(gpio))
        }
        #[cfg(not(all(target_os = "linux", feature = "gpio")))]
        Some(pin) => {
            warn!(
                "serial.direction_pin = {pin} is set but the gpio feature is not built in, \
                 falling back to automatic direction"
            );
            Ok(Box::new(NoopDirection))
        }
        None => Ok(Box::new(NoopDirection)),
    }
}
