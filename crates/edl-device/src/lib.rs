//! # EDL Device Session Layer
//!
//! 设备会话抽象层：上层编排逻辑只通过 [`DeviceSession`] trait 与设备交互。
//!
//! 设备发现、USB 传输及其分帧、驱动内部的采集线程都属于会话实现的内部细节，
//! 对上层只暴露 trait 中列出的同步操作。状态查询、读取、清空都立即返回快照
//! 或有限数量的数据，不会阻塞等待新数据到达。
//!
//! ## 后端
//!
//! - `sim`（默认）：[`sim::SimulatedDevice`]，连接后启动独立采集线程生成波形数据
//! - `mock`：[`mock::MockDevice`]，脚本化设备，用于上层单元测试

use edl_protocol::{AcquisitionBatch, CommandId, CommandPayload, DeviceStatus, ProtocolError};
use std::fmt;
use thiserror::Error;

#[cfg(feature = "sim")]
pub mod sim;

#[cfg(feature = "sim")]
pub use sim::{SimConfig, SimulatedDevice};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// 设备会话层统一错误类型
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Backend(#[from] DeviceBackendError),
    #[error("Protocol Error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("No device found")]
    NotFound,
    #[error("Device not connected")]
    NotConnected,
    #[error("Device already connected")]
    AlreadyConnected,
    #[error("Device busy")]
    Busy,
}

impl DeviceError {
    /// 是否为"设备未连接"
    pub fn is_not_connected(&self) -> bool {
        matches!(self, DeviceError::NotConnected)
    }
}

/// 后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceBackendErrorKind {
    Unknown,
    AccessDenied,
    Disconnected,
    InvalidResponse,
    Backend,
}

/// 结构化后端错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct DeviceBackendError {
    pub kind: DeviceBackendErrorKind,
    pub message: String,
}

impl DeviceBackendError {
    pub fn new(kind: DeviceBackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<String> for DeviceBackendError {
    fn from(message: String) -> Self {
        Self::new(DeviceBackendErrorKind::Unknown, message)
    }
}

impl From<&str> for DeviceBackendError {
    fn from(message: &str) -> Self {
        Self::new(DeviceBackendErrorKind::Unknown, message)
    }
}

/// 设备标识（序列号）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 读取结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// 返回了请求的全部帧
    Complete,
    /// 可用数据少于请求数量；返回的部分数据仍然有效
    InsufficientData { requested: u32 },
}

/// 一次读取的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub status: ReadStatus,
    pub batch: AcquisitionBatch,
}

impl ReadOutcome {
    pub fn complete(batch: AcquisitionBatch) -> Self {
        Self {
            status: ReadStatus::Complete,
            batch,
        }
    }

    pub fn insufficient(requested: u32, batch: AcquisitionBatch) -> Self {
        Self {
            status: ReadStatus::InsufficientData { requested },
            batch,
        }
    }

    /// 实际读取的帧数
    pub fn actual_count(&self) -> usize {
        self.batch.frame_count()
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.status, ReadStatus::InsufficientData { .. })
    }
}

/// 设备会话接口
///
/// 一个实现代表一条物理连接，由上层独占持有，不可复制。
pub trait DeviceSession {
    /// 枚举已插入的设备；没有设备时返回 `DeviceError::NotFound`
    fn detect_devices(&mut self) -> Result<Vec<DeviceId>, DeviceError>;

    /// 建立会话并启动内部采集线程
    fn connect(&mut self, device: &DeviceId) -> Result<(), DeviceError>;

    /// 压栈或下发命令
    ///
    /// `apply == false` 时命令仅在设备侧暂存；`apply == true` 时所有暂存命令
    /// 连同本条一起生效。
    fn set_command(
        &mut self,
        id: CommandId,
        payload: CommandPayload,
        apply: bool,
    ) -> Result<(), DeviceError>;

    /// 丢弃设备缓冲区中的全部数据
    fn purge_data(&mut self) -> Result<(), DeviceError>;

    /// 查询设备状态；溢出 / 丢数标志在读取后复位
    fn device_status(&mut self) -> Result<DeviceStatus, DeviceError>;

    /// 读取最多 `requested` 个数据帧
    ///
    /// - `Err(DeviceError::NotConnected)`: 设备未连接（致命）
    /// - `Ok` 且 `ReadStatus::InsufficientData`: 仅返回了部分数据（非致命）
    fn read_data(&mut self, requested: u32) -> Result<ReadOutcome, DeviceError>;

    /// 断开连接
    fn disconnect(&mut self) -> Result<(), DeviceError>;

    /// 每个数据帧的通道数
    fn channel_count(&self) -> usize {
        edl_protocol::EDL_CHANNEL_NUM
    }
}
