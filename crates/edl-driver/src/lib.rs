//! # EDL Driver
//!
//! 测量会话编排层：在 [`edl_device::DeviceSession`] 之上实现
//! 命令序列、失调补偿、刺激协议加载、流式采集和有界重试断开。
//!
//! ## 模块
//!
//! - `sequencer`: 命令压栈 / 下发
//! - `modality`: 工作模式配置
//! - `compensation`: 数字失调补偿
//! - `protocol`: 刺激协议加载
//! - `acquisition`: 流式采集循环
//! - `retry`: 有界重试断开
//! - `session` / `builder`: 会话状态机与构造
//! - `runner`: 固定测量流程
//! - `sink`: 原始数据输出
//! - `observer`: 采集事件回调
//! - `clock`: 可注入的时钟与等待策略
//!
//! ## 快速开始
//!
//! ```no_run
//! use edl_device::SimulatedDevice;
//! use edl_driver::{SessionBuilder, run_measurement};
//!
//! let mut session = SessionBuilder::new(SimulatedDevice::default()).build()?;
//! let report = run_measurement(&mut session)?;
//! println!("{} frames written", report.acquisition.frames_written);
//! # Ok::<(), edl_driver::SessionError>(())
//! ```

pub mod acquisition;
mod builder;
pub mod clock;
pub mod compensation;
pub mod config;
pub mod error;
pub mod modality;
pub mod observer;
pub mod protocol;
pub mod retry;
pub mod runner;
pub mod sequencer;
pub mod session;
pub mod sink;
pub mod state;

pub use acquisition::{AcquisitionConfig, AcquisitionLoop, AcquisitionReport, StopReason};
pub use builder::SessionBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use compensation::{CompensationConfig, CompensationController};
pub use config::{DEFAULT_OUTPUT_PATH, SessionConfig};
pub use error::SessionError;
pub use modality::{WorkingModality, configure_working_modality};
pub use observer::{AcquisitionObserver, ObserverSet};
pub use protocol::{ProtocolArmer, StimulusProtocol};
pub use retry::{DisconnectRetrier, RetryPolicy};
pub use runner::{MeasurementReport, run_measurement};
pub use sequencer::{CommandSequencer, PendingBatch};
pub use session::Session;
pub use sink::{FrameSink, MemorySink, RawFileSink, read_raw_samples};
pub use state::SessionState;
