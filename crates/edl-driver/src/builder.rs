//! Builder 模式实现
//!
//! 提供链式构造 [`Session`] 的便捷方式。
//!
//! # Example
//!
//! ```no_run
//! use edl_device::SimulatedDevice;
//! use edl_driver::{SessionBuilder, SessionConfig};
//!
//! let mut config = SessionConfig::default();
//! config.acquisition.min_batch_threshold = 20;
//!
//! let session = SessionBuilder::new(SimulatedDevice::default())
//!     .config(config)
//!     .build()
//!     .unwrap();
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::observer::{AcquisitionObserver, ObserverSet};
use crate::session::Session;
use edl_device::DeviceSession;
use std::sync::Arc;

/// Session Builder（链式构造）
pub struct SessionBuilder<D: DeviceSession, C: Clock = SystemClock> {
    device: D,
    clock: C,
    config: Option<SessionConfig>,
    observers: ObserverSet,
}

impl<D: DeviceSession> SessionBuilder<D, SystemClock> {
    /// 使用系统时钟创建 Builder
    pub fn new(device: D) -> Self {
        Self {
            device,
            clock: SystemClock,
            config: None,
            observers: ObserverSet::new(),
        }
    }
}

impl<D: DeviceSession, C: Clock> SessionBuilder<D, C> {
    /// 替换时钟（测试中使用 `ManualClock`）
    pub fn clock<C2: Clock>(self, clock: C2) -> SessionBuilder<D, C2> {
        SessionBuilder {
            device: self.device,
            clock,
            config: self.config,
            observers: self.observers,
        }
    }

    /// 设置会话配置（可选，默认 `SessionConfig::default()`）
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 添加采集观察者
    pub fn observer(mut self, observer: Arc<dyn AcquisitionObserver>) -> Self {
        self.observers.add_observer(observer);
        self
    }

    /// 校验配置并构建会话
    pub fn build(self) -> Result<Session<D, C>, SessionError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(Session::with_parts(
            self.device,
            self.clock,
            config,
            self.observers,
        ))
    }
}
