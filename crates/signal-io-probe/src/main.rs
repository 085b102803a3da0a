//! Signal I/O probe
//!
//! Opens the configured devices through their backends and runs a short control loop
//! on each: read every input channel, write the configured outputs, watch for faults.
//! Every blocking device call is bounded by a watchdog.

mod session;

use anyhow::{Context, Result};
use clap::Parser;
use signal_io_config::{DeviceEntry, LoggingConfig, SignalIoConfig};
use signal_io_hal::BackendRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

use session::{SessionReport, run_device};

#[derive(Debug, Parser)]
#[command(name = "signal-io-probe", version, about)]
struct Args {
    /// Configuration file (defaults to $SIGNAL_IO_CONFIG or /etc/signal-io/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device to open instead of the configured ones, e.g. mock:channels=2
    #[arg(short, long = "device", value_name = "BACKEND:PARAMS")]
    devices: Vec<String>,

    /// Override the number of control cycles
    #[arg(long)]
    cycles: Option<u32>,

    /// Print the available backends and exit
    #[arg(long)]
    list_backends: bool,

    /// Print the per-device reports as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let registry = Arc::new(BackendRegistry::with_builtins());

    if args.list_backends {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => SignalIoConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => SignalIoConfig::load_default().context("Failed to load configuration")?,
    };
    apply_overrides(&mut config, &args)?;

    setup_logging(&config.logging);
    info!(
        "Probing {} device(s), {} cycle(s) each",
        config.devices.len(),
        config.control.cycles
    );

    let mut tasks = JoinSet::new();
    for entry in config.devices.clone() {
        let registry = Arc::clone(&registry);
        let control = config.control.clone();
        tasks.spawn(async move {
            let name = entry.name.clone();
            (name, run_device(&registry, &entry, &control).await)
        });
    }

    let mut reports = Vec::new();
    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        let (name, outcome) = joined.context("Device task panicked")?;
        match outcome {
            Ok(report) => {
                log_report(&name, &report);
                reports.push((name, report));
            }
            Err(e) => {
                error!("Device '{}' failed: {:#}", name, e);
                failures += 1;
            }
        }
    }

    if args.json {
        reports.sort_by(|a, b| a.0.cmp(&b.0));
        let json: serde_json::Map<String, serde_json::Value> = reports
            .iter()
            .map(|(name, report)| (name.clone(), report.to_json()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    if failures > 0 {
        anyhow::bail!("{failures} device(s) failed");
    }
    Ok(())
}

fn apply_overrides(config: &mut SignalIoConfig, args: &Args) -> Result<()> {
    if !args.devices.is_empty() {
        config.devices = args
            .devices
            .iter()
            .enumerate()
            .map(|(i, device)| DeviceEntry::from_device_string(&format!("device{i}"), device))
            .collect::<Result<_, _>>()?;
    }
    if let Some(cycles) = args.cycles {
        config.control.cycles = cycles;
    }
    config.validate()?;
    Ok(())
}

/// Install the fmt subscriber, filtered by RUST_LOG or the configured level
fn setup_logging(logging: &LoggingConfig) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(logging.ansi))
        .init();
}

fn log_report(name: &str, report: &SessionReport) {
    info!(
        "Device '{}': {} cycle(s), {} samples, {} failed read(s), {} write(s), {} fault(s), {} reset(s)",
        name,
        report.cycles,
        report.samples_read,
        report.failed_reads,
        report.writes,
        report.faults,
        report.resets
    );
    if report.watchdog_expiries > 0 {
        error!(
            "Device '{}': watchdog expired {} time(s)",
            name, report.watchdog_expiries
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_override() {
        let args = Args::parse_from([
            "signal-io-probe",
            "--device",
            "loopback:channels=1",
            "--device",
            "mock:channels=3",
            "--cycles",
            "2",
        ]);
        let mut config = SignalIoConfig::default();

        apply_overrides(&mut config, &args).unwrap();

        assert_eq!(config.control.cycles, 2);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].backend, "loopback");
        assert_eq!(config.devices[1].name, "device1");
    }

    #[test]
    fn test_bad_device_override() {
        let args = Args::parse_from(["signal-io-probe", "-d", "channels=3"]);
        let mut config = SignalIoConfig::default();
        assert!(apply_overrides(&mut config, &args).is_err());
    }
}
