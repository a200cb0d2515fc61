//! TESS-W 4C reader service.
//!
//! Listens for UDP datagrams from TESS-W 4C photometers and writes enriched
//! readings to files, a database and/or a REST API while the device's site
//! is inside its night window.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use photometer_common::registry::example_config;
use photometer_common::{forward_shutdown, DeviceKind, NightWindowGate, Registry};
use sinks::{SinkArgs, SinkDispatcher};
use tessw4c_reader::{Tessw4cListener, DEFAULT_UDP_PORT};

#[derive(Parser, Debug)]
#[command(name = "tessw4c-reader")]
#[command(about = "TESS-W 4C photometer reader", version)]
struct Args {
    /// Site and device configuration file
    #[arg(long, env = "CONFIG_FILE", default_value = "config.yaml")]
    config_file: PathBuf,

    /// Print an example configuration file and exit
    #[arg(long)]
    config_file_example: bool,

    /// IP address to bind to
    #[arg(long, env = "UDP_BIND_IP", default_value = "0.0.0.0")]
    udp_bind_ip: IpAddr,

    /// UDP port to listen on
    #[arg(long, env = "UDP_PORT", default_value_t = DEFAULT_UDP_PORT)]
    udp_port: u16,

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
    info!(version = env!("CARGO_PKG_VERSION"), "Starting TESSW4C reader");

    if let Some(port) = args.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port, "Prometheus metrics exporter initialized");
    }

    let registry = Registry::load(&args.config_file)
        .context("Failed to load site and device configuration")?
        .retain_kind(DeviceKind::Tessw4c);
    info!(
        sites = registry.site_count(),
        devices = registry.device_count(),
        "Loaded registry"
    );

    let dispatcher = SinkDispatcher::from_config(&args.sinks.to_config())
        .await
        .context("Failed to set up sinks")?;
    if dispatcher.is_empty() {
        warn!("No sinks enabled, readings will be discarded");
    }

    let listener = Tessw4cListener::bind(
        SocketAddr::new(args.udp_bind_ip, args.udp_port),
        Arc::new(registry),
        Arc::new(NightWindowGate::default()),
        dispatcher,
    )
    .await?;

    // Handle Ctrl+C
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), shutdown_tx));

    let stats = listener.run(shutdown_rx).await?;
    info!(
        received = stats.received,
        dispatched = stats.dispatched,
        "Exiting TESSW4C reader on user request"
    );

    Ok(())
}
