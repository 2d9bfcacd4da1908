//! 有界重试断开

use crate::clock::Clock;
use crate::error::SessionError;
use edl_device::{DeviceError, DeviceSession};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 两次尝试之间的退避（毫秒）
    pub backoff_ms: u64,
    /// 可选的总时间窗口（毫秒），与尝试次数先到者为准
    pub time_budget_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1000,
            backoff_ms: 1,
            time_budget_ms: None,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// 断开重试器
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectRetrier {
    policy: RetryPolicy,
}

impl DisconnectRetrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 反复尝试断开，首次成功即停止
    ///
    /// 两次尝试之间等待 `backoff_ms`，第一次尝试前和最后一次失败后不等待。
    ///
    /// # 参数
    ///
    /// - `device`: 要断开的设备会话
    /// - `clock`: 退避等待和时间预算使用的时钟
    ///
    /// # 返回
    ///
    /// 成功时返回实际尝试次数（至少为 1）。
    ///
    /// # 错误
    ///
    /// - `DisconnectExhausted`: 次数预算或时间预算耗尽，携带最后一次的设备错误
    ///
    /// # 示例
    ///
    /// ```rust,no_run
    /// use edl_device::{DeviceSession, SimulatedDevice};
    /// use edl_driver::{DisconnectRetrier, RetryPolicy, SystemClock};
    ///
    /// let mut device = SimulatedDevice::default();
    /// let id = device.detect_devices()?.remove(0);
    /// device.connect(&id)?;
    ///
    /// let retrier = DisconnectRetrier::new(RetryPolicy::default());
    /// let attempts = retrier.disconnect(&mut device, &SystemClock)?;
    /// println!("disconnected after {attempts} attempts");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn disconnect<D, C>(&self, device: &mut D, clock: &C) -> Result<u32, SessionError>
    where
        D: DeviceSession + ?Sized,
        C: Clock + ?Sized,
    {
        let start = clock.now();
        let budget = self.policy.time_budget_ms.map(Duration::from_millis);
        let mut attempts = 0u32;
        let mut last = DeviceError::Busy;

        while attempts < self.policy.max_attempts {
            if attempts > 0 {
                if budget.is_some_and(|b| clock.elapsed(start) >= b) {
                    debug!("Disconnect time window elapsed after {} attempts", attempts);
                    break;
                }
                clock.sleep(self.policy.backoff());
            }

            attempts += 1;
            match device.disconnect() {
                Ok(()) => {
                    info!("Device disconnected after {} attempt(s)", attempts);
                    return Ok(attempts);
                },
                Err(e) => {
                    debug!("Disconnect attempt {} failed: {}", attempts, e);
                    last = e;
                },
            }
        }

        error!("Failed to disconnect device after {} attempts", attempts);
        Err(SessionError::DisconnectExhausted { attempts, last })
    }
}
