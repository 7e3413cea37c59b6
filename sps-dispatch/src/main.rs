use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use jiff::tz::TimeZone;
use sps_dispatch::link::{self, discover_ports};
use sps_dispatch::{
    Config, CsvSink, Dispatcher, MemorySink, MockSensorLink, MqttSink, SensorController,
    SensorSession, SensorsConfig, SerialLink, StorageConfig, SystemClock, TelemetryConfig,
    WaitPolicy,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "sps-dispatch")]
#[command(about = "SPS30 particulate sensor dispatcher")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "sps-dispatch.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tracing=info,sps_dispatch=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    let tz = config.time_zone()?;
    let cancel = CancellationToken::new();
    let wait = WaitPolicy::new(config.sampling.tick(), config.sampling.response_timeout())
        .with_cancellation(cancel.clone());
    let interval = Duration::from_secs(config.sampling.interval_secs);

    info!(
        interval_secs = config.sampling.interval_secs,
        timezone = tz.iana_name().unwrap_or("system"),
        "Starting sps-dispatch"
    );

    match &config.sensors {
        SensorsConfig::Serial { port_prefix, ports } => {
            let mut controllers = Vec::new();
            for port in discover_ports(port_prefix, ports)? {
                match link::open(&port) {
                    Ok(link) => {
                        info!(%port, "Opened sensor port");
                        let session = SensorSession::new(port, link, wait.clone());
                        controllers.push(SensorController::new(session, interval));
                    }
                    Err(e) => error!(%port, error = %e, "Failed to open sensor port, skipping"),
                }
            }
            run_dispatcher(&config, tz, controllers, cancel).await
        }
        SensorsConfig::Mock { count } => {
            info!(count, "Using mock sensors");
            let controllers = (0..*count)
                .map(|i| {
                    let link = MockSensorLink::new(format!("MOCK{i:04}"));
                    let session = SensorSession::new(format!("mock{i}"), link, wait.clone());
                    SensorController::new(session, interval)
                })
                .collect();
            run_dispatcher(&config, tz, controllers, cancel).await
        }
    }
}

async fn run_dispatcher<L: SerialLink>(
    config: &Config,
    tz: TimeZone,
    controllers: Vec<SensorController<L>>,
    cancel: CancellationToken,
) -> color_eyre::Result<()> {
    if controllers.is_empty() {
        warn!("No sensors found, nothing to do");
        return Ok(());
    }

    let mut dispatcher = Dispatcher::new(Arc::new(SystemClock::new(tz)), config.sampling.tick());
    for controller in controllers {
        dispatcher.register(controller);
    }

    let memory = match &config.storage {
        StorageConfig::Disabled => None,
        StorageConfig::Memory => {
            info!("Using in-memory storage");
            let sink = MemorySink::default();
            dispatcher.add_sink(Box::new(sink.clone()));
            Some(sink)
        }
        StorageConfig::Csv { dir } => {
            info!(dir = ?dir, "Using CSV storage");
            dispatcher.add_sink(Box::new(CsvSink::new(dir)));
            None
        }
    };

    match &config.telemetry {
        TelemetryConfig::Disabled => {}
        TelemetryConfig::Mqtt(mqtt) => {
            info!(host = %mqtt.host, port = mqtt.port, topic = %mqtt.topic, "Publishing to MQTT");
            dispatcher.add_sink(Box::new(MqttSink::new(mqtt.clone())));
        }
    }

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            ctrl_c.cancel();
        }
    });

    let stats = dispatcher.run(cancel).await;

    if let Some(memory) = memory {
        info!(stored = memory.len()?, "In-memory readings at shutdown");
    }
    if stats.failed_sensors > 0 {
        warn!(failed = stats.failed_sensors, "Some sensors were removed after errors");
    }

    info!("sps-dispatch shut down complete");
    Ok(())
}
