//! 模拟刺激波形

use edl_protocol::ProtocolId;

/// 设备侧暂存的协议参数
///
/// `MainTrial` / `Vhold` / `Vamp` / `TPeriod` 只修改暂存值，
/// 直到 `ApplyProtocol` 生效时才转换为 [`Waveform`]。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtocolStage {
    pub protocol: ProtocolId,
    pub hold_mv: f64,
    pub amplitude_mv: f64,
    pub period_ms: f64,
}

impl Default for ProtocolStage {
    fn default() -> Self {
        Self {
            protocol: ProtocolId::Constant,
            hold_mv: 0.0,
            amplitude_mv: 0.0,
            period_ms: 100.0,
        }
    }
}

impl ProtocolStage {
    pub fn to_waveform(self) -> Waveform {
        match self.protocol {
            ProtocolId::Constant => Waveform::Constant {
                hold_mv: self.hold_mv,
            },
            ProtocolId::Triangular => Waveform::Triangular {
                hold_mv: self.hold_mv,
                amplitude_mv: self.amplitude_mv,
                period_ms: self.period_ms,
            },
            ProtocolId::SquareWave => Waveform::SquareWave {
                hold_mv: self.hold_mv,
                amplitude_mv: self.amplitude_mv,
                period_ms: self.period_ms,
            },
        }
    }
}

/// 正在输出的电压波形
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Constant {
        hold_mv: f64,
    },
    /// 在 `hold - amp` 与 `hold + amp` 之间线性往返
    Triangular {
        hold_mv: f64,
        amplitude_mv: f64,
        period_ms: f64,
    },
    /// 前半周期 `hold + amp`，后半周期 `hold`
    SquareWave {
        hold_mv: f64,
        amplitude_mv: f64,
        period_ms: f64,
    },
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Constant { hold_mv: 0.0 }
    }
}

impl Waveform {
    /// `t_s` 时刻（秒）的电压（mV）
    pub fn voltage_mv(&self, t_s: f64) -> f64 {
        match *self {
            Waveform::Constant { hold_mv } => hold_mv,
            Waveform::Triangular {
                hold_mv,
                amplitude_mv,
                period_ms,
            } => match phase(t_s, period_ms) {
                Some(p) => hold_mv + amplitude_mv * (1.0 - 4.0 * (p - 0.5).abs()),
                None => hold_mv,
            },
            Waveform::SquareWave {
                hold_mv,
                amplitude_mv,
                period_ms,
            } => match phase(t_s, period_ms) {
                Some(p) if p < 0.5 => hold_mv + amplitude_mv,
                _ => hold_mv,
            },
        }
    }
}

/// 周期内相位 `[0, 1)`；周期非正时返回 `None`
fn phase(t_s: f64, period_ms: f64) -> Option<f64> {
    if period_ms <= 0.0 || !period_ms.is_finite() {
        return None;
    }
    let period_s = period_ms / 1000.0;
    Some((t_s / period_s).fract())
}
