//! 有界重试断开测试

use edl_device::DeviceError;
use edl_device::mock::MockDevice;
use edl_driver::{DisconnectRetrier, ManualClock, RetryPolicy, SessionError};

#[test]
fn test_fail_j_times_then_succeed() {
    for j in [0u32, 1, 7, 999] {
        let mut device = MockDevice::connected(5).with_disconnect_failures(j);
        let clock = ManualClock::new();

        let attempts = DisconnectRetrier::default()
            .disconnect(&mut device, &clock)
            .unwrap();

        assert_eq!(attempts, j + 1);
        assert_eq!(device.disconnect_attempts, j + 1);
        assert!(!device.is_connected());
    }
}

#[test]
fn test_never_succeeds_exhausts_budget() {
    let mut device = MockDevice::connected(5).with_disconnect_failures(u32::MAX);
    let clock = ManualClock::new();

    let err = DisconnectRetrier::default()
        .disconnect(&mut device, &clock)
        .unwrap_err();

    assert_eq!(device.disconnect_attempts, 1000);
    assert!(err.is_fatal());
    match err {
        SessionError::DisconnectExhausted { attempts, last } => {
            assert_eq!(attempts, 1000);
            assert!(matches!(last, DeviceError::Busy));
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_custom_attempt_budget() {
    let mut device = MockDevice::connected(5).with_disconnect_failures(10);
    let clock = ManualClock::new();
    let retrier = DisconnectRetrier::new(RetryPolicy {
        max_attempts: 10,
        ..RetryPolicy::default()
    });

    assert!(retrier.disconnect(&mut device, &clock).is_err());
    assert_eq!(device.disconnect_attempts, 10);
    assert_eq!(clock.sleep_count(), 9);
}
