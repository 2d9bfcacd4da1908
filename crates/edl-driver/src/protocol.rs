//! 刺激协议配置与加载
//!
//! 每种协议有自己的参数集，经校验后与协议选择一起压栈，
//! 最后以 `ApplyProtocol` 一次下发，使新波形生效。

use crate::error::SessionError;
use crate::sequencer::{CommandSequencer, PendingBatch};
use edl_device::DeviceSession;
use edl_protocol::{CommandRequest, ProtocolError, ProtocolId};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 刺激协议及其参数（电位 / 幅值单位 mV，周期单位 ms）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StimulusProtocol {
    /// 恒定电位
    Constant { hold_mv: f64 },
    /// 三角波
    Triangular {
        hold_mv: f64,
        amplitude_mv: f64,
        period_ms: f64,
    },
    /// 方波
    SquareWave {
        hold_mv: f64,
        amplitude_mv: f64,
        period_ms: f64,
    },
}

impl Default for StimulusProtocol {
    /// 三角波：保持 0 mV，幅值 50 mV，周期 100 ms
    fn default() -> Self {
        StimulusProtocol::Triangular {
            hold_mv: 0.0,
            amplitude_mv: 50.0,
            period_ms: 100.0,
        }
    }
}

impl StimulusProtocol {
    pub fn id(&self) -> ProtocolId {
        match self {
            StimulusProtocol::Constant { .. } => ProtocolId::Constant,
            StimulusProtocol::Triangular { .. } => ProtocolId::Triangular,
            StimulusProtocol::SquareWave { .. } => ProtocolId::SquareWave,
        }
    }

    pub fn hold_mv(&self) -> f64 {
        match *self {
            StimulusProtocol::Constant { hold_mv }
            | StimulusProtocol::Triangular { hold_mv, .. }
            | StimulusProtocol::SquareWave { hold_mv, .. } => hold_mv,
        }
    }

    /// 校验参数
    ///
    /// 所有数值必须有限，幅值不能为负，周期必须为正。
    pub fn validate(&self) -> Result<(), ProtocolError> {
        finite("hold_mv", self.hold_mv())?;
        match *self {
            StimulusProtocol::Constant { .. } => Ok(()),
            StimulusProtocol::Triangular {
                amplitude_mv,
                period_ms,
                ..
            }
            | StimulusProtocol::SquareWave {
                amplitude_mv,
                period_ms,
                ..
            } => {
                finite("amplitude_mv", amplitude_mv)?;
                finite("period_ms", period_ms)?;
                if amplitude_mv < 0.0 {
                    return Err(ProtocolError::InvalidParameter {
                        field: "amplitude_mv",
                        value: amplitude_mv,
                    });
                }
                if period_ms <= 0.0 {
                    return Err(ProtocolError::InvalidParameter {
                        field: "period_ms",
                        value: period_ms,
                    });
                }
                Ok(())
            },
        }
    }

    /// 对应的命令请求序列（以 `ApplyProtocol` 结尾）
    pub fn requests(&self) -> PendingBatch {
        let mut requests = PendingBatch::new();
        requests.push(CommandRequest::MainTrial(self.id()));
        requests.push(CommandRequest::Vhold(self.hold_mv()));
        if let StimulusProtocol::Triangular {
            amplitude_mv,
            period_ms,
            ..
        }
        | StimulusProtocol::SquareWave {
            amplitude_mv,
            period_ms,
            ..
        } = *self
        {
            requests.push(CommandRequest::Vamp(amplitude_mv));
            requests.push(CommandRequest::TPeriod(period_ms));
        }
        requests.push(CommandRequest::ApplyProtocol);
        requests
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ProtocolError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ProtocolError::InvalidParameter { field, value })
    }
}

/// 协议加载器
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolArmer {
    protocol: StimulusProtocol,
}

impl ProtocolArmer {
    pub fn new(protocol: StimulusProtocol) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> &StimulusProtocol {
        &self.protocol
    }

    /// 校验并下发协议；校验失败时不接触设备
    pub fn arm<D>(&self, device: &mut D, sequencer: &mut CommandSequencer) -> Result<(), SessionError>
    where
        D: DeviceSession + ?Sized,
    {
        self.protocol.validate()?;
        sequencer.submit(device, &self.protocol.requests())?;
        info!("Stimulus protocol armed: {:?}", self.protocol);
        Ok(())
    }
}
