//! 完整测量流程测试

use edl_device::mock::{MockDevice, MockRead, MockStatus};
use edl_device::{SimConfig, SimulatedDevice};
use edl_driver::{
    ManualClock, SessionBuilder, SessionConfig, SessionError, SessionState, read_raw_samples,
    run_measurement,
};
use edl_protocol::{CommandId, DeviceStatus, EDL_CHANNEL_NUM};
use std::time::Duration;

fn config_in(dir: &tempfile::TempDir) -> SessionConfig {
    SessionConfig {
        output_path: dir.path().join("data.dat"),
        ..SessionConfig::default()
    }
}

#[test]
fn test_mock_measurement_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let device = MockDevice::new(EDL_CHANNEL_NUM)
        .with_statuses([
            MockStatus::Ok(DeviceStatus::new(15)),
            MockStatus::Ok(DeviceStatus::new(4)),
            MockStatus::Ok(DeviceStatus::new(22)),
        ])
        .with_disconnect_failures(2);
    let clock = ManualClock::new();

    let mut session = SessionBuilder::new(device)
        .config(config.clone())
        .clock(clock.clone())
        .build()
        .unwrap();

    let report = run_measurement(&mut session).unwrap();
    assert_eq!(report.device.as_str(), "MOCK-0001");
    assert_eq!(report.acquisition.frames_written, 37);
    assert_eq!(report.disconnect_attempts, 3);
    assert_eq!(session.state(), SessionState::Disconnected);

    let device = session.into_device();
    let ids: Vec<CommandId> = device.commands.iter().map(|c| c.id).collect();
    assert_eq!(
        ids,
        vec![
            // 工作模式
            CommandId::SamplingRate,
            CommandId::Range,
            CommandId::FinalBandwidth,
            // 补偿
            CommandId::MainTrial,
            CommandId::Vhold,
            CommandId::ApplyProtocol,
            CommandId::CompAll,
            CommandId::CompAll,
            // 三角波协议
            CommandId::MainTrial,
            CommandId::Vhold,
            CommandId::Vamp,
            CommandId::TPeriod,
            CommandId::ApplyProtocol,
        ]
    );
    assert_eq!(device.purges, 1);

    // 补偿驻留和 settle 都经由虚拟时钟
    let sleeps = clock.sleeps();
    assert!(sleeps.contains(&Duration::from_millis(5000)));
    assert!(sleeps.contains(&Duration::from_millis(500)));

    let batch = read_raw_samples(&config.output_path, EDL_CHANNEL_NUM).unwrap();
    assert_eq!(batch.frame_count(), 37);
}

#[test]
fn test_fatal_read_tears_down_session() {
    let dir = tempfile::tempdir().unwrap();
    let device = MockDevice::new(EDL_CHANNEL_NUM)
        .with_statuses([MockStatus::Ok(DeviceStatus::new(10))])
        .with_reads([MockRead::NotConnected]);

    let mut session = SessionBuilder::new(device)
        .config(config_in(&dir))
        .clock(ManualClock::new())
        .build()
        .unwrap();

    let err = run_measurement(&mut session).unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));

    let device = session.into_device();
    assert_eq!(device.disconnect_attempts, 1);
    assert!(!device.is_connected());
}

#[test]
fn test_connect_failure_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = SessionBuilder::new(MockDevice::new(EDL_CHANNEL_NUM).failing_connect())
        .config(config_in(&dir))
        .clock(ManualClock::new())
        .build()
        .unwrap();

    let err = run_measurement(&mut session).unwrap_err();
    assert!(matches!(err, SessionError::Connect(_)));
    assert_eq!(session.state(), SessionState::Faulted);

    let device = session.into_device();
    assert!(device.commands.is_empty());
    assert_eq!(device.purges, 0);
    assert_eq!(device.disconnect_attempts, 0);
    assert!(!dir.path().join("data.dat").exists());
}

#[test]
fn test_simulated_device_measurement() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.compensation.dwell_ms = 20;
    config.acquisition.settle_ms = 10;
    config.acquisition.max_polls = 200;

    let device = SimulatedDevice::new(SimConfig {
        startup_delay_ms: 0,
        ..SimConfig::default()
    });
    let mut session = SessionBuilder::new(device).config(config.clone()).build().unwrap();

    let report = run_measurement(&mut session).unwrap();
    assert!(report.disconnect_attempts >= 1);
    assert_eq!(
        report.acquisition.bytes_written,
        report.acquisition.frames_written * (EDL_CHANNEL_NUM as u64) * 4
    );

    let batch = read_raw_samples(&config.output_path, EDL_CHANNEL_NUM).unwrap();
    assert_eq!(batch.frame_count() as u64, report.acquisition.frames_written);

    // 三角波：保持 0 mV，幅值 50 mV
    for frame in batch.frames() {
        assert!(frame.voltage_mv().abs() <= 50.0 + 1e-3);
    }
}
