//! # EDL Protocol
//!
//! EDL 电生理放大器的命令与数据布局定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `command`: 命令标识、选择器枚举、带标签的命令请求
//! - `constants`: 通道数、采样字节宽度等协议常量
//! - `frame`: 数据帧 / 采集批次布局
//! - `status`: 设备状态快照
//!
//! ## 数据布局
//!
//! 每个数据帧（packet）包含固定数量的 `f32` 通道值：
//! 通道 0 为电压通道（mV），其余通道为电流通道（pA 或 nA，取决于量程配置）。

pub mod command;
pub mod constants;
pub mod frame;
pub mod status;

// 重新导出常用类型
pub use command::*;
pub use constants::*;
pub use frame::*;
pub use status::*;

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u16 },

    #[error("Payload {payload:?} does not match command {id:?}")]
    PayloadMismatch { id: CommandId, payload: CommandPayload },

    #[error("Invalid batch layout: {len} samples is not a multiple of {channel_count} channels")]
    InvalidBatchLayout { len: usize, channel_count: usize },

    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(usize),

    #[error("Invalid protocol parameter {field}: {value}")]
    InvalidParameter { field: &'static str, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidValue {
            field: "SamplingRate".to_string(),
            value: 42,
        };
        assert_eq!(err.to_string(), "Invalid value for field SamplingRate: 42");

        let err = ProtocolError::InvalidBatchLayout {
            len: 7,
            channel_count: 5,
        };
        assert!(err.to_string().contains("not a multiple of 5"));

        let err = ProtocolError::PayloadMismatch {
            id: CommandId::Vhold,
            payload: CommandPayload::Empty,
        };
        assert!(err.to_string().contains("Vhold"));
    }
}
