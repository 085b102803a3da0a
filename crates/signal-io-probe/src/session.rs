//! Per-device control loop
//!
//! The signal I/O operations block the calling thread, so each one runs on the blocking
//! pool under a watchdog timeout. A call that outlives the watchdog is abandoned, the
//! loop stops, and the device is still released and ended.

use anyhow::{Result, anyhow, bail};
use signal_io_config::{ControlConfig, DeviceEntry};
use signal_io_hal::{BackendRegistry, DeviceId, Plugin};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Highest input channel index probed when discovering readable channels
const MAX_PROBED_CHANNELS: u32 = 64;

/// Counters collected over one device session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub cycles: u32,
    pub input_channels: usize,
    pub samples_read: u64,
    pub failed_reads: u64,
    pub writes: u64,
    pub failed_writes: u64,
    pub faults: u32,
    pub resets: u32,
    pub watchdog_expiries: u32,
}

impl SessionReport {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cycles": self.cycles,
            "input_channels": self.input_channels,
            "samples_read": self.samples_read,
            "failed_reads": self.failed_reads,
            "writes": self.writes,
            "failed_writes": self.failed_writes,
            "faults": self.faults,
            "resets": self.resets,
            "watchdog_expiries": self.watchdog_expiries,
        })
    }
}

#[derive(Debug, Error)]
enum CallError {
    #[error("{0} exceeded the watchdog")]
    Watchdog(&'static str),
    #[error("device call panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// An open device on a loaded backend
struct DeviceSession {
    name: String,
    plugin: Plugin,
    device: i64,
    watchdog: Duration,
    batch: usize,
    inputs: Vec<u32>,
    acquired: Vec<u32>,
}

impl DeviceSession {
    async fn open(
        registry: &BackendRegistry,
        entry: &DeviceEntry,
        watchdog: Duration,
    ) -> Result<Self> {
        let plugin = registry.load(&entry.backend)?;
        let config = entry.config.clone();
        let device = call(
            &plugin,
            DeviceId::INVALID_RAW,
            watchdog,
            "InitDevice",
            move |p, _| p.init_device(&config),
        )
        .await
        .map_err(|e| anyhow!("{}: {e}", entry.name))?;

        if device == DeviceId::INVALID_RAW {
            bail!(
                "{}: backend '{}' rejected configuration '{}'",
                entry.name,
                entry.backend,
                entry.config
            );
        }

        let mut session = Self {
            name: entry.name.clone(),
            plugin,
            device,
            watchdog,
            batch: 0,
            inputs: Vec::new(),
            acquired: Vec::new(),
        };

        if let Err(e) = session.describe().await {
            session.close().await;
            return Err(anyhow!("{}: {e}", entry.name));
        }
        Ok(session)
    }

    async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: FnOnce(&Plugin, i64) -> T + Send + 'static,
    {
        call(&self.plugin, self.device, self.watchdog, op, f).await
    }

    /// Query batch size and readable input channels
    async fn describe(&mut self) -> Result<(), CallError> {
        self.batch = self
            .call("GetMaxInputSamplesNumber", |p, d| p.get_max_input_samples_number(d))
            .await?;
        self.inputs = self
            .call("CheckInputChannel", |p, d| {
                (0..MAX_PROBED_CHANNELS)
                    .filter(|&channel| p.check_input_channel(d, channel))
                    .collect::<Vec<_>>()
            })
            .await?;

        if self.batch == 0 {
            warn!("Device '{}' reports no input samples per read", self.name);
        }
        info!(
            "Device '{}' ({}): {} samples per read, input channels {:?}",
            self.name,
            self.plugin.name(),
            self.batch,
            self.inputs
        );
        Ok(())
    }

    async fn acquire(&mut self, channels: Vec<u32>) -> Result<(), CallError> {
        for channel in channels {
            if self.acquired.contains(&channel) {
                continue;
            }
            let granted = self
                .call("AcquireOutputChannel", move |p, d| {
                    p.acquire_output_channel(d, channel)
                })
                .await?;
            if granted {
                self.acquired.push(channel);
            } else {
                warn!(
                    "Device '{}': output channel {} unavailable",
                    self.name, channel
                );
            }
        }
        Ok(())
    }

    /// One read/write/fault-check iteration
    async fn cycle(
        &mut self,
        writes: &[(u32, f64)],
        auto_reset: bool,
        report: &mut SessionReport,
    ) -> Result<(), CallError> {
        let batch = self.batch;
        let inputs = self.inputs.clone();
        let (samples, failed) = self
            .call("Read", move |p, d| {
                let mut buf = vec![0.0; batch];
                let mut samples = 0u64;
                let mut failed = 0u64;
                for channel in inputs {
                    match p.read(d, channel, &mut buf) {
                        0 => failed += 1,
                        n => {
                            samples += n as u64;
                            debug!("channel {}: last sample {}", channel, buf[n - 1]);
                        }
                    }
                }
                (samples, failed)
            })
            .await?;
        report.samples_read += samples;
        report.failed_reads += failed;

        let writes: Vec<(u32, f64)> = writes
            .iter()
            .copied()
            .filter(|(channel, _)| self.acquired.contains(channel))
            .collect();
        let (ok, rejected) = self
            .call("Write", move |p, d| {
                writes.iter().fold((0u64, 0u64), |(ok, rejected), &(channel, value)| {
                    if p.write(d, channel, value) {
                        (ok + 1, rejected)
                    } else {
                        (ok, rejected + 1)
                    }
                })
            })
            .await?;
        report.writes += ok;
        report.failed_writes += rejected;

        if self.call("HasError", |p, d| p.has_error(d)).await? {
            report.faults += 1;
            warn!("Device '{}' reports a fault", self.name);
            if auto_reset {
                self.call("Reset", |p, d| p.reset(d)).await?;
                report.resets += 1;
            }
        }

        report.cycles += 1;
        Ok(())
    }

    /// Release held channels and end the device
    ///
    /// Runs even after a watchdog expiry; these calls are best effort.
    async fn close(self) {
        let acquired = self.acquired.clone();
        let released = self
            .call("ReleaseOutputChannel", move |p, d| {
                for channel in acquired {
                    p.release_output_channel(d, channel);
                }
            })
            .await;
        let ended = self.call("EndDevice", |p, d| p.end_device(d)).await;

        match released.and(ended) {
            Ok(()) => info!("Device '{}' closed", self.name),
            Err(e) => warn!("Device '{}' did not close cleanly: {}", self.name, e),
        }
    }
}

/// Run a blocking plugin call under the watchdog
async fn call<T, F>(
    plugin: &Plugin,
    device: i64,
    watchdog: Duration,
    op: &'static str,
    f: F,
) -> Result<T, CallError>
where
    T: Send + 'static,
    F: FnOnce(&Plugin, i64) -> T + Send + 'static,
{
    let plugin = plugin.clone();
    let task = tokio::task::spawn_blocking(move || f(&plugin, device));
    match tokio::time::timeout(watchdog, task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(CallError::Watchdog(op)),
    }
}

/// Open one configured device, run the control loop and close it
pub async fn run_device(
    registry: &BackendRegistry,
    entry: &DeviceEntry,
    control: &ControlConfig,
) -> Result<SessionReport> {
    let mut session = DeviceSession::open(registry, entry, control.watchdog()).await?;
    let mut report = SessionReport {
        input_channels: session.inputs.len(),
        ..SessionReport::default()
    };
    let writes: Vec<(u32, f64)> = entry.writes.iter().map(|w| (w.channel, w.value)).collect();

    let outcome = run_cycles(&mut session, &writes, control, &mut report).await;
    if let Err(CallError::Watchdog(op)) = &outcome {
        report.watchdog_expiries += 1;
        warn!("Device '{}': {} exceeded the watchdog, stopping", entry.name, op);
    }
    session.close().await;

    match outcome {
        Ok(()) | Err(CallError::Watchdog(_)) => Ok(report),
        Err(e) => Err(anyhow!("{}: {e}", entry.name)),
    }
}

async fn run_cycles(
    session: &mut DeviceSession,
    writes: &[(u32, f64)],
    control: &ControlConfig,
    report: &mut SessionReport,
) -> Result<(), CallError> {
    let channels: Vec<u32> = writes.iter().map(|&(channel, _)| channel).collect();
    session.acquire(channels).await?;

    let mut ticker = tokio::time::interval(control.period());
    for _ in 0..control.cycles {
        ticker.tick().await;
        session.cycle(writes, control.auto_reset, report).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_io_config::OutputWrite;
    use signal_io_hal::{MockBackend, SignalIo};
    use std::sync::Arc;

    /// Mock whose reads stall past any reasonable watchdog
    struct StallingBackend(MockBackend);

    impl SignalIo for StallingBackend {
        fn name(&self) -> &str {
            "stalling"
        }
        fn init_device(&self, config: &str) -> signal_io_hal::Result<DeviceId> {
            self.0.init_device(config.trim_start_matches("stalling:"))
        }
        fn end_device(&self, device: DeviceId) {
            self.0.end_device(device)
        }
        fn reset(&self, device: DeviceId) {
            self.0.reset(device)
        }
        fn has_error(&self, device: DeviceId) -> bool {
            self.0.has_error(device)
        }
        fn max_input_samples(&self, device: DeviceId) -> signal_io_hal::Result<usize> {
            self.0.max_input_samples(device)
        }
        fn check_input_channel(&self, device: DeviceId, channel: u32) -> bool {
            self.0.check_input_channel(device, channel)
        }
        fn read(
            &self,
            device: DeviceId,
            channel: u32,
            buf: &mut [f64],
        ) -> signal_io_hal::Result<usize> {
            std::thread::sleep(Duration::from_millis(300));
            self.0.read(device, channel, buf)
        }
        fn acquire_output_channel(
            &self,
            device: DeviceId,
            channel: u32,
        ) -> signal_io_hal::Result<()> {
            self.0.acquire_output_channel(device, channel)
        }
        fn release_output_channel(&self, device: DeviceId, channel: u32) {
            self.0.release_output_channel(device, channel)
        }
        fn write(&self, device: DeviceId, channel: u32, value: f64) -> signal_io_hal::Result<()> {
            self.0.write(device, channel, value)
        }
    }

    fn control(cycles: u32) -> ControlConfig {
        ControlConfig {
            cycles,
            period_ms: 1,
            watchdog_ms: 1000,
            auto_reset: true,
        }
    }

    fn entry(backend: &str, config: &str) -> DeviceEntry {
        DeviceEntry {
            name: "test".into(),
            backend: backend.into(),
            config: config.into(),
            writes: vec![],
        }
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_run_device_future_is_send() {
        let registry = BackendRegistry::with_builtins();
        let entry = entry("mock", "mock:channels=1");
        let control = control(1);

        // Required by JoinSet::spawn in main
        assert_send(run_device(&registry, &entry, &control));
    }

    #[test]
    fn test_call_error_messages() {
        assert_eq!(
            CallError::Watchdog("Read").to_string(),
            "Read exceeded the watchdog"
        );
    }

    #[tokio::test]
    async fn test_mock_session() {
        let registry = BackendRegistry::with_builtins();
        let mut entry = entry("mock", "mock:channels=2,samples=4");
        entry.writes.push(OutputWrite {
            channel: 1,
            value: 2.5,
        });

        let report = run_device(&registry, &entry, &control(3)).await.unwrap();

        assert_eq!(report.cycles, 3);
        assert_eq!(report.input_channels, 2);
        assert_eq!(report.samples_read, 3 * 2 * 4);
        assert_eq!(report.writes, 3);
        assert_eq!(report.failed_writes, 0);
        assert_eq!(report.faults, 0);
    }

    #[tokio::test]
    async fn test_fault_is_reset() {
        let registry = BackendRegistry::with_builtins();
        let entry = entry("mock", "mock:channels=1,fault_after=2");

        let report = run_device(&registry, &entry, &control(4)).await.unwrap();

        assert_eq!(report.failed_reads, 1);
        assert_eq!(report.faults, 1);
        assert_eq!(report.resets, 1);
        assert_eq!(report.samples_read, 3 * 4);
    }

    #[tokio::test]
    async fn test_unavailable_output_is_skipped() {
        let registry = BackendRegistry::with_builtins();
        let mut entry = entry("loopback", "loopback:channels=1");
        entry.writes.push(OutputWrite {
            channel: 3,
            value: 1.0,
        });

        let report = run_device(&registry, &entry, &control(2)).await.unwrap();

        assert_eq!(report.writes, 0);
        assert_eq!(report.cycles, 2);
    }

    #[tokio::test]
    async fn test_rejected_configuration() {
        let registry = BackendRegistry::with_builtins();

        let err = run_device(&registry, &entry("mock", "mock:channels=0"), &control(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rejected configuration"));

        assert!(
            run_device(&registry, &entry("daqmx", "daqmx:"), &control(1))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_watchdog_stops_session() {
        let mut registry = BackendRegistry::new();
        registry.register("stalling", || Arc::new(StallingBackend(MockBackend::new())));
        let control = ControlConfig {
            watchdog_ms: 50,
            ..control(5)
        };

        let report = run_device(&registry, &entry("stalling", "stalling:"), &control)
            .await
            .unwrap();

        assert_eq!(report.watchdog_expiries, 1);
        assert_eq!(report.cycles, 0);
    }
}
