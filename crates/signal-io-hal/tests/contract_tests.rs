//! Integration tests for the signal I/O contract through the plugin boundary

use signal_io_hal::{BackendRegistry, DeviceId, MockBackend, Plugin, SignalIo};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn mock_plugin() -> (Arc<MockBackend>, Plugin) {
    let backend = Arc::new(MockBackend::new());
    let plugin = Plugin::new(backend.clone());
    (backend, plugin)
}

#[test]
fn test_end_to_end_scenario() {
    let (backend, plugin) = mock_plugin();

    let device = plugin.init_device("mock:channels=2");
    assert_ne!(device, DeviceId::INVALID_RAW);

    assert_eq!(plugin.get_max_input_samples_number(device), 4);
    assert!(plugin.check_input_channel(device, 0));
    assert!(!plugin.check_input_channel(device, 5));

    assert!(plugin.acquire_output_channel(device, 1));
    assert!(!plugin.acquire_output_channel(device, 1));
    assert!(plugin.write(device, 1, 2.5));

    plugin.release_output_channel(device, 1);
    assert!(!plugin.write(device, 1, 2.5));

    plugin.end_device(device);
    assert_eq!(backend.live_devices(), 0);
    assert_eq!(plugin.get_max_input_samples_number(device), 0);
}

#[test]
fn test_no_error_after_init() {
    let registry = BackendRegistry::with_builtins();

    for config in ["mock:channels=2", "loopback:channels=2"] {
        let (plugin, device) = registry.open(config).unwrap();
        assert!(!plugin.has_error(device), "{config}");
        plugin.end_device(device);
    }
}

#[test]
fn test_fault_lifecycle() {
    let (backend, plugin) = mock_plugin();
    let device = plugin.init_device("mock:");
    let id = DeviceId::from_raw(device).unwrap();

    backend.inject_fault(id, "sensor disconnected").unwrap();
    for _ in 0..5 {
        assert!(plugin.has_error(device));
    }

    let mut buf = vec![0.0; plugin.get_max_input_samples_number(device)];
    assert_eq!(plugin.read(device, 0, &mut buf), 0);

    plugin.reset(device);
    assert!(!plugin.has_error(device));
    assert_eq!(plugin.read(device, 0, &mut buf), buf.len());
}

#[test]
fn test_write_without_acquisition_has_no_effect() {
    let (backend, plugin) = mock_plugin();
    let device = plugin.init_device("mock:channels=2");
    let id = DeviceId::from_raw(device).unwrap();

    assert!(!plugin.write(device, 0, 9.0));
    assert_eq!(backend.output_value(id, 0), Some(0.0));

    assert!(plugin.acquire_output_channel(device, 0));
    plugin.release_output_channel(device, 0);
    assert!(!plugin.write(device, 0, 9.0));
    assert_eq!(backend.write_count(id), Some(0));
}

#[test]
fn test_read_count_bounds() {
    let (_, plugin) = mock_plugin();
    let device = plugin.init_device("mock:channels=3,samples=16");
    let max = plugin.get_max_input_samples_number(device);
    let mut buf = vec![0.0; max];

    for channel in 0..8 {
        let count = plugin.read(device, channel, &mut buf);
        assert!(count <= max);
        if !plugin.check_input_channel(device, channel) {
            assert_eq!(count, 0);
        } else {
            assert_eq!(count, max);
        }
    }

    // Undersized buffers are a usage error
    let mut small = vec![0.0; max - 1];
    assert_eq!(plugin.read(device, 0, &mut small), 0);
    assert!(!plugin.has_error(device));
}

#[test]
fn test_release_idempotent() {
    let (backend, plugin) = mock_plugin();
    let device = plugin.init_device("mock:");
    let id = DeviceId::from_raw(device).unwrap();

    plugin.release_output_channel(device, 0);
    plugin.release_output_channel(device, 0);
    assert_eq!(
        backend.channel_state(id, 0),
        Some(signal_io_hal::ChannelState::Free)
    );
    assert!(plugin.acquire_output_channel(device, 0));
}

#[test]
fn test_end_device_releases_channels() {
    let (_, plugin) = mock_plugin();
    let device = plugin.init_device("mock:");
    assert!(plugin.acquire_output_channel(device, 0));

    plugin.end_device(device);
    plugin.end_device(device);
    assert!(!plugin.acquire_output_channel(device, 0));

    let next = plugin.init_device("mock:");
    assert_ne!(next, device);
    assert!(plugin.acquire_output_channel(next, 0));
}

#[test]
fn test_devices_are_independent() {
    let (backend, plugin) = mock_plugin();
    let a = plugin.init_device("mock:");
    let b = plugin.init_device("mock:");

    backend
        .inject_fault(DeviceId::from_raw(a).unwrap(), "a only")
        .unwrap();
    assert!(plugin.has_error(a));
    assert!(!plugin.has_error(b));

    assert!(plugin.acquire_output_channel(a, 0));
    assert!(plugin.acquire_output_channel(b, 0));
}

#[test]
fn test_concurrent_acquisition_single_winner() {
    let (_, plugin) = mock_plugin();
    let device = plugin.init_device("mock:channels=4");
    let winners = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..32 {
            scope.spawn(|| {
                if plugin.acquire_output_channel(device, 2) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_reads_on_different_channels() {
    let backend = MockBackend::new();
    let device = backend.init_device("mock:channels=4,samples=32").unwrap();

    std::thread::scope(|scope| {
        for channel in 0..4 {
            let backend = &backend;
            scope.spawn(move || {
                let mut buf = [0.0; 32];
                for _ in 0..50 {
                    assert_eq!(backend.read(device, channel, &mut buf).unwrap(), 32);
                }
            });
        }
    });

    assert!(!backend.has_error(device));
}

#[test]
fn test_loopback_closes_the_loop() -> anyhow::Result<()> {
    let registry = BackendRegistry::with_builtins();
    let (plugin, device) = registry.open("loopback:channels=1,samples=2")?;
    let mut buf = [0.0; 2];

    assert!(plugin.acquire_output_channel(device, 0));
    for setpoint in [0.5, 1.5, -2.0] {
        assert!(plugin.write(device, 0, setpoint));
        assert_eq!(plugin.read(device, 0, &mut buf), 2);
        assert_eq!(buf, [setpoint; 2]);
    }

    plugin.end_device(device);
    Ok(())
}

#[test]
fn test_usage_errors_do_not_fault_the_device() {
    let (_, plugin) = mock_plugin();
    let device = plugin.init_device("mock:samples=4,fault_after=1");
    let mut small = [0.0; 2];
    let mut buf = [0.0; 4];

    assert_eq!(plugin.read(device, 0, &mut small), 0);
    assert_eq!(plugin.read(device, 7, &mut buf), 0);
    assert!(!plugin.has_error(device));

    // The pending simulated fault fires on the first valid read
    assert_eq!(plugin.read(device, 0, &mut buf), 0);
    assert!(plugin.has_error(device));
}

#[test]
fn test_release_fences_concurrent_writes() -> anyhow::Result<()> {
    let registry = BackendRegistry::with_builtins();
    let (plugin, device) = registry.open("loopback:channels=1,samples=1")?;
    let mut buf = [0.0; 1];
    assert!(plugin.acquire_output_channel(device, 0));

    std::thread::scope(|scope| {
        let writer = scope.spawn(|| {
            let mut value = 1.0;
            while plugin.write(device, 0, value) {
                value += 1.0;
            }
        });
        std::thread::sleep(std::time::Duration::from_millis(5));
        plugin.release_output_channel(device, 0);
        assert_eq!(plugin.read(device, 0, &mut buf), 1);
        let level = buf[0];
        writer.join().unwrap();

        assert_eq!(plugin.read(device, 0, &mut buf), 1);
        assert_eq!(buf[0], level);
    });

    plugin.end_device(device);
    Ok(())
}
