//! 会话层错误类型定义

use crate::state::SessionState;
use edl_device::DeviceError;
use edl_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// 会话层错误类型
///
/// 每一类致命条件对应一个独立变体，便于上层给出对应阶段的诊断信息。
#[derive(Error, Debug)]
pub enum SessionError {
    /// 设备发现失败（未找到设备或枚举出错）
    #[error("Device discovery failed: {0}")]
    Discovery(#[source] DeviceError),

    /// 连接设备失败
    #[error("Failed to connect device: {0}")]
    Connect(#[source] DeviceError),

    /// 清空设备缓冲区失败，采集未开始
    #[error("Failed to purge device data: {0}")]
    Purge(#[source] DeviceError),

    /// 采集过程中查询设备状态失败
    #[error("Failed to query device status: {0}")]
    Status(#[source] DeviceError),

    /// 读取数据时设备报告未连接
    #[error("Device not connected during read")]
    NotConnected,

    /// 读取数据的其它失败
    #[error("Failed to read device data: {0}")]
    Read(#[source] DeviceError),

    /// 下发命令失败
    #[error("Command failed: {0}")]
    Command(#[source] DeviceError),

    /// 输出文件错误
    #[error("Sink error ({path:?}): {source}")]
    Sink {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// 断开重试耗尽
    #[error("Disconnect failed after {attempts} attempts: {last}")]
    DisconnectExhausted {
        attempts: u32,
        #[source]
        last: DeviceError,
    },

    /// 当前状态不允许该操作
    #[error("Invalid session state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// 刺激协议参数无效
    #[error("Invalid stimulus protocol: {0}")]
    InvalidProtocol(#[from] ProtocolError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(String),
}

impl SessionError {
    /// 是否使会话进入 `Faulted` 状态
    ///
    /// 状态检查、协议参数和配置错误发生在触碰设备之前，不改变会话状态。
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SessionError::InvalidState { .. }
                | SessionError::InvalidProtocol(_)
                | SessionError::Config(_)
        )
    }

    pub(crate) fn sink(path: Option<PathBuf>, source: std::io::Error) -> Self {
        SessionError::Sink { path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::Discovery(DeviceError::NotFound);
        assert_eq!(err.to_string(), "Device discovery failed: No device found");

        let err = SessionError::DisconnectExhausted {
            attempts: 1000,
            last: DeviceError::Busy,
        };
        let msg = err.to_string();
        assert!(msg.contains("1000") && msg.contains("Device busy"), "{}", msg);

        let err = SessionError::InvalidState {
            expected: SessionState::Armed,
            actual: SessionState::Connected,
        };
        assert!(err.to_string().contains("Armed"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SessionError::NotConnected.is_fatal());
        assert!(SessionError::Status(DeviceError::Busy).is_fatal());
        assert!(SessionError::Purge(DeviceError::NotConnected).is_fatal());
        assert!(!SessionError::Config("bad".into()).is_fatal());
        assert!(
            !SessionError::InvalidState {
                expected: SessionState::Armed,
                actual: SessionState::Faulted,
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_from_protocol_error() {
        let err: SessionError = ProtocolError::InvalidParameter {
            field: "period_ms",
            value: -1.0,
        }
        .into();
        assert!(matches!(err, SessionError::InvalidProtocol(_)));
    }
}
