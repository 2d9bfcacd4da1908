//! 命令定义
//!
//! 每条命令由 [`CommandId`] 寻址，并携带且只携带与该标识相关的参数。
//! [`CommandRequest`] 是带标签的和类型（sum type），因此不存在
//! "字段组合无效"的请求：例如不可能构造一个同时携带采样率和按钮状态的请求。
//!
//! 设备会话接口层（`edl-device`）只看到 `(CommandId, CommandPayload)`，
//! 两者之间的转换由本模块负责并校验。

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 命令标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum CommandId {
    /// 采样率选择
    SamplingRate = 0,
    /// 电流量程选择
    Range = 1,
    /// 最终带宽（数字滤波器）选择
    FinalBandwidth = 2,
    /// 主刺激协议选择
    MainTrial = 3,
    /// 保持电位（mV）
    Vhold = 4,
    /// 刺激幅值（mV）
    Vamp = 5,
    /// 刺激周期（ms）
    TPeriod = 6,
    /// 应用当前协议参数
    ApplyProtocol = 7,
    /// 全通道数字失调补偿按钮
    CompAll = 8,
}

impl CommandId {
    /// 该命令接受的参数形状
    pub fn payload_kind(self) -> PayloadKind {
        match self {
            CommandId::SamplingRate | CommandId::Range | CommandId::FinalBandwidth => {
                PayloadKind::Radio
            },
            CommandId::MainTrial | CommandId::Vhold | CommandId::Vamp | CommandId::TPeriod => {
                PayloadKind::Value
            },
            CommandId::CompAll => PayloadKind::Button,
            CommandId::ApplyProtocol => PayloadKind::Empty,
        }
    }
}

/// 参数形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// 单选项（选择器 id）
    Radio,
    /// 数值
    Value,
    /// 按钮状态
    Button,
    /// 无参数
    Empty,
}

/// 采样率选择器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum SamplingRate {
    Khz1_25 = 0,
    Khz5 = 1,
    Khz10 = 2,
    Khz20 = 3,
    Khz50 = 4,
    Khz100 = 5,
    Khz200 = 6,
}

impl SamplingRate {
    /// 采样频率（Hz）
    pub fn hz(self) -> f64 {
        match self {
            SamplingRate::Khz1_25 => 1_250.0,
            SamplingRate::Khz5 => 5_000.0,
            SamplingRate::Khz10 => 10_000.0,
            SamplingRate::Khz20 => 20_000.0,
            SamplingRate::Khz50 => 50_000.0,
            SamplingRate::Khz100 => 100_000.0,
            SamplingRate::Khz200 => 200_000.0,
        }
    }
}

/// 电流量程选择器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum CurrentRange {
    Pa200 = 0,
    Na2 = 1,
    Na20 = 2,
    Na200 = 3,
}

impl CurrentRange {
    /// 电流通道的数据单位
    ///
    /// 200 pA 量程以 pA 输出，其余量程以 nA 输出。
    pub fn unit(self) -> CurrentUnit {
        match self {
            CurrentRange::Pa200 => CurrentUnit::PicoAmps,
            _ => CurrentUnit::NanoAmps,
        }
    }
}

/// 电流通道单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentUnit {
    PicoAmps,
    NanoAmps,
}

impl CurrentUnit {
    /// 把 pA 数值换算到该单位
    pub fn from_pa(self, value_pa: f64) -> f64 {
        match self {
            CurrentUnit::PicoAmps => value_pa,
            CurrentUnit::NanoAmps => value_pa / 1_000.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CurrentUnit::PicoAmps => "pA",
            CurrentUnit::NanoAmps => "nA",
        }
    }
}

/// 最终带宽选择器（相对采样率的分频）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum FinalBandwidth {
    /// 不滤波：带宽为采样率的一半
    Sr2 = 0,
    Sr4 = 1,
    Sr10 = 2,
    Sr20 = 3,
    Sr50 = 4,
    Sr100 = 5,
}

impl FinalBandwidth {
    /// 采样率分频系数
    pub fn divisor(self) -> u32 {
        match self {
            FinalBandwidth::Sr2 => 2,
            FinalBandwidth::Sr4 => 4,
            FinalBandwidth::Sr10 => 10,
            FinalBandwidth::Sr20 => 20,
            FinalBandwidth::Sr50 => 50,
            FinalBandwidth::Sr100 => 100,
        }
    }

    /// 给定采样率下的带宽（Hz）
    pub fn bandwidth_hz(self, rate: SamplingRate) -> f64 {
        rate.hz() / self.divisor() as f64
    }
}

/// 刺激协议标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum ProtocolId {
    /// 恒定电位（基线条件）
    Constant = 0,
    /// 三角波
    Triangular = 1,
    /// 方波
    SquareWave = 2,
}

/// 按钮状态（用于补偿命令）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ButtonState {
    #[default]
    Released,
    Pressed,
}

/// 设备会话接口层看到的参数形状
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandPayload {
    Radio(u16),
    Value(f64),
    Button(ButtonState),
    Empty,
}

impl CommandPayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            CommandPayload::Radio(_) => PayloadKind::Radio,
            CommandPayload::Value(_) => PayloadKind::Value,
            CommandPayload::Button(_) => PayloadKind::Button,
            CommandPayload::Empty => PayloadKind::Empty,
        }
    }
}

/// 命令请求（带标签的参数）
///
/// 数值单位：电位 / 幅值为 mV，周期为 ms。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandRequest {
    SamplingRate(SamplingRate),
    Range(CurrentRange),
    FinalBandwidth(FinalBandwidth),
    MainTrial(ProtocolId),
    Vhold(f64),
    Vamp(f64),
    TPeriod(f64),
    ApplyProtocol,
    CompensateAll(ButtonState),
}

impl CommandRequest {
    /// 命令标识
    pub fn id(&self) -> CommandId {
        match self {
            CommandRequest::SamplingRate(_) => CommandId::SamplingRate,
            CommandRequest::Range(_) => CommandId::Range,
            CommandRequest::FinalBandwidth(_) => CommandId::FinalBandwidth,
            CommandRequest::MainTrial(_) => CommandId::MainTrial,
            CommandRequest::Vhold(_) => CommandId::Vhold,
            CommandRequest::Vamp(_) => CommandId::Vamp,
            CommandRequest::TPeriod(_) => CommandId::TPeriod,
            CommandRequest::ApplyProtocol => CommandId::ApplyProtocol,
            CommandRequest::CompensateAll(_) => CommandId::CompAll,
        }
    }

    /// 转换为接口层参数
    pub fn payload(&self) -> CommandPayload {
        match *self {
            CommandRequest::SamplingRate(rate) => CommandPayload::Radio(rate.into()),
            CommandRequest::Range(range) => CommandPayload::Radio(range.into()),
            CommandRequest::FinalBandwidth(bw) => CommandPayload::Radio(bw.into()),
            // 协议选择在设备侧以数值形式下发
            CommandRequest::MainTrial(protocol) => CommandPayload::Value(u16::from(protocol) as f64),
            CommandRequest::Vhold(mv) => CommandPayload::Value(mv),
            CommandRequest::Vamp(mv) => CommandPayload::Value(mv),
            CommandRequest::TPeriod(ms) => CommandPayload::Value(ms),
            CommandRequest::ApplyProtocol => CommandPayload::Empty,
            CommandRequest::CompensateAll(button) => CommandPayload::Button(button),
        }
    }

    /// 拆分为 `(CommandId, CommandPayload)`
    pub fn into_parts(self) -> (CommandId, CommandPayload) {
        (self.id(), self.payload())
    }

    /// 从接口层的 `(CommandId, CommandPayload)` 还原请求
    ///
    /// 参数形状与命令标识不匹配、或选择器越界时返回错误。
    pub fn from_parts(id: CommandId, payload: CommandPayload) -> Result<Self, ProtocolError> {
        let mismatch = || ProtocolError::PayloadMismatch { id, payload };
        if payload.kind() != id.payload_kind() {
            return Err(mismatch());
        }

        match (id, payload) {
            (CommandId::SamplingRate, CommandPayload::Radio(v)) => {
                radio::<SamplingRate>("SamplingRate", v).map(CommandRequest::SamplingRate)
            },
            (CommandId::Range, CommandPayload::Radio(v)) => {
                radio::<CurrentRange>("Range", v).map(CommandRequest::Range)
            },
            (CommandId::FinalBandwidth, CommandPayload::Radio(v)) => {
                radio::<FinalBandwidth>("FinalBandwidth", v).map(CommandRequest::FinalBandwidth)
            },
            (CommandId::MainTrial, CommandPayload::Value(v)) => {
                if v < 0.0 || v.fract() != 0.0 || v > u16::MAX as f64 {
                    return Err(mismatch());
                }
                radio::<ProtocolId>("MainTrial", v as u16).map(CommandRequest::MainTrial)
            },
            (CommandId::Vhold, CommandPayload::Value(v)) => Ok(CommandRequest::Vhold(v)),
            (CommandId::Vamp, CommandPayload::Value(v)) => Ok(CommandRequest::Vamp(v)),
            (CommandId::TPeriod, CommandPayload::Value(v)) => Ok(CommandRequest::TPeriod(v)),
            (CommandId::ApplyProtocol, CommandPayload::Empty) => Ok(CommandRequest::ApplyProtocol),
            (CommandId::CompAll, CommandPayload::Button(b)) => Ok(CommandRequest::CompensateAll(b)),
            _ => Err(mismatch()),
        }
    }
}

fn radio<T: TryFrom<u16>>(field: &str, value: u16) -> Result<T, ProtocolError> {
    T::try_from(value).map_err(|_| ProtocolError::InvalidValue {
        field: field.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kind_matches_request() {
        let requests = [
            CommandRequest::SamplingRate(SamplingRate::Khz5),
            CommandRequest::Range(CurrentRange::Pa200),
            CommandRequest::FinalBandwidth(FinalBandwidth::Sr2),
            CommandRequest::MainTrial(ProtocolId::Triangular),
            CommandRequest::Vhold(0.0),
            CommandRequest::Vamp(50.0),
            CommandRequest::TPeriod(100.0),
            CommandRequest::ApplyProtocol,
            CommandRequest::CompensateAll(ButtonState::Pressed),
        ];

        for request in requests {
            assert_eq!(
                request.id().payload_kind(),
                request.payload().kind(),
                "request {:?}",
                request
            );
        }
    }

    #[test]
    fn test_from_parts_restores_request() {
        let request = CommandRequest::MainTrial(ProtocolId::Triangular);
        let (id, payload) = request.into_parts();
        assert_eq!(payload, CommandPayload::Value(1.0));
        assert_eq!(CommandRequest::from_parts(id, payload).unwrap(), request);

        let request = CommandRequest::CompensateAll(ButtonState::Released);
        let (id, payload) = request.into_parts();
        assert_eq!(CommandRequest::from_parts(id, payload).unwrap(), request);
    }

    #[test]
    fn test_from_parts_rejects_wrong_shape() {
        let err = CommandRequest::from_parts(CommandId::SamplingRate, CommandPayload::Value(5.0))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadMismatch { .. }));

        let err = CommandRequest::from_parts(CommandId::ApplyProtocol, CommandPayload::Radio(0))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadMismatch { .. }));

        let err = CommandRequest::from_parts(CommandId::MainTrial, CommandPayload::Value(0.5))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadMismatch { .. }));
    }

    #[test]
    fn test_from_parts_rejects_unknown_selector() {
        let err =
            CommandRequest::from_parts(CommandId::Range, CommandPayload::Radio(99)).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidValue {
                field: "Range".to_string(),
                value: 99
            }
        );
    }

    #[test]
    fn test_selector_conversions() {
        assert_eq!(u16::from(SamplingRate::Khz5), 1);
        assert_eq!(SamplingRate::try_from(6u16).unwrap(), SamplingRate::Khz200);
        assert!(SamplingRate::try_from(7u16).is_err());
        assert_eq!(CommandId::try_from(8u16).unwrap(), CommandId::CompAll);
    }

    #[test]
    fn test_current_unit() {
        assert_eq!(CurrentRange::Pa200.unit(), CurrentUnit::PicoAmps);
        assert_eq!(CurrentRange::Na2.unit(), CurrentUnit::NanoAmps);
        assert_eq!(CurrentUnit::NanoAmps.from_pa(1500.0), 1.5);
        assert_eq!(CurrentUnit::PicoAmps.symbol(), "pA");
    }

    #[test]
    fn test_bandwidth() {
        assert_eq!(FinalBandwidth::Sr2.bandwidth_hz(SamplingRate::Khz5), 2_500.0);
        assert_eq!(FinalBandwidth::Sr100.divisor(), 100);
    }
}
