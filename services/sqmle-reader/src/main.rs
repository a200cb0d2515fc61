//! SQM-LE reader service.
//!
//! Polls every configured SQM-LE over TCP on a fixed schedule and writes
//! enriched readings to files, a database and/or a REST API while the
//! device's site is inside its night window.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use photometer_common::registry::example_config;
use photometer_common::{
    forward_shutdown, Device, DeviceKind, NightWindowGate, Registry, WindowGate,
};
use sinks::{SinkArgs, SinkDispatcher};
use sqmle_reader::{PollSchedule, SqmCommand, SqmleClient, SqmlePoller};

#[derive(Parser, Debug)]
#[command(name = "sqmle-reader")]
#[command(about = "SQM-LE photometer reader", version)]
struct Args {
    /// Site and device configuration file
    #[arg(long, env = "CONFIG_FILE", default_value = "config.yaml")]
    config_file: PathBuf,

    /// Print an example configuration file and exit
    #[arg(long)]
    config_file_example: bool,

    /// Only poll this device (serial id); polls all SQM-LE devices by default
    #[arg(long, env = "DEVICE")]
    device: Option<String>,

    /// Command to send: rx, Rx, cx or ix
    #[arg(long, env = "SQM_COMMAND", default_value = "Rx")]
    command: SqmCommand,

    /// Readings per device, 0 to poll until interrupted
    #[arg(long, env = "NUMBER_OF_READS", default_value_t = 3)]
    number_of_reads: u32,

    /// Seconds between readings
    #[arg(long, env = "READS_FREQUENCY", default_value_t = 30)]
    reads_frequency: u64,

    /// Connect and read timeout in seconds
    #[arg(long, env = "TIMEOUT_SECS", default_value_t = 5)]
    timeout_secs: u64,

    #[command(flatten)]
    sinks: SinkArgs,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format: text or json
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Expose Prometheus metrics on this port
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

fn init_tracing(log_level: &str, log_format: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if log_format.eq_ignore_ascii_case("json") {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if args.config_file_example {
        println!(
            "# Add this to a .yaml file, \
             reference it later with --config-file <file_name>.yaml"
        );
        print!("{}", serde_yaml::to_string(&example_config())?);
        return Ok(());
    }

    init_tracing(&args.log_level, &args.log_format)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting SQMLE reader");

    if let Some(port) = args.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port, "Prometheus metrics exporter initialized");
    }

    let registry = Registry::load(&args.config_file)
        .context("Failed to load site and device configuration")?
        .retain_kind(DeviceKind::Sqmle);

    let devices: Vec<Device> = match &args.device {
        Some(id) => vec![registry
            .require(id)
            .with_context(|| format!("Device not found in {}", args.config_file.display()))?
            .clone()],
        None => registry
            .devices_of(DeviceKind::Sqmle)
            .into_iter()
            .cloned()
            .collect(),
    };
    if devices.is_empty() {
        bail!("No active SQMLE devices in {}", args.config_file.display());
    }
    info!(
        sites = registry.site_count(),
        devices = devices.len(),
        "Loaded registry"
    );

    let dispatcher = SinkDispatcher::from_config(&args.sinks.to_config())
        .await
        .context("Failed to set up sinks")?;
    if dispatcher.is_empty() {
        warn!("No sinks enabled, readings will be discarded");
    }
    let gate: Arc<dyn WindowGate> = Arc::new(NightWindowGate::default());
    let schedule = PollSchedule {
        command: args.command,
        number_of_reads: args.number_of_reads,
        reads_frequency: Duration::from_secs(args.reads_frequency),
    };

    // Handle Ctrl+C
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), signal_tx));

    let mut pollers = Vec::with_capacity(devices.len());
    for device in devices {
        let client = SqmleClient::new(device)?.with_timeout(Duration::from_secs(args.timeout_secs));
        let poller = SqmlePoller::new(client, schedule, gate.clone(), dispatcher.clone());
        pollers.push(tokio::spawn(poller.run(shutdown_tx.subscribe())));
    }

    for result in join_all(pollers).await {
        let stats = result.context("SQM-LE poller task panicked")?;
        info!(
            attempted = stats.attempted,
            dispatched = stats.dispatched,
            failed = stats.failed,
            "Poller done"
        );
    }

    info!("Exiting SQMLE reader");
    Ok(())
}
