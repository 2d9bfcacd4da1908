//! 工作模式配置（采样率、量程、最终带宽）

use crate::error::SessionError;
use crate::sequencer::CommandSequencer;
use edl_device::DeviceSession;
use edl_protocol::{CommandRequest, CurrentRange, CurrentUnit, FinalBandwidth, SamplingRate};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 工作模式
///
/// 三个参数一起压栈，最后一条带 apply 标记，一次下发。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingModality {
    pub sampling_rate: SamplingRate,
    pub range: CurrentRange,
    pub final_bandwidth: FinalBandwidth,
}

impl Default for WorkingModality {
    /// 5 kHz、200 pA、不滤波（SR/2）
    fn default() -> Self {
        Self {
            sampling_rate: SamplingRate::Khz5,
            range: CurrentRange::Pa200,
            final_bandwidth: FinalBandwidth::Sr2,
        }
    }
}

impl WorkingModality {
    /// 电流通道数据单位
    pub fn current_unit(&self) -> CurrentUnit {
        self.range.unit()
    }

    /// 对应的命令请求序列
    pub fn requests(&self) -> [CommandRequest; 3] {
        [
            CommandRequest::SamplingRate(self.sampling_rate),
            CommandRequest::Range(self.range),
            CommandRequest::FinalBandwidth(self.final_bandwidth),
        ]
    }
}

/// 下发工作模式
pub fn configure_working_modality<D>(
    device: &mut D,
    sequencer: &mut CommandSequencer,
    modality: &WorkingModality,
) -> Result<(), SessionError>
where
    D: DeviceSession + ?Sized,
{
    sequencer.submit(device, &modality.requests())?;
    info!(
        "Working modality: {} Hz, range {:?} ({}), bandwidth {} Hz",
        modality.sampling_rate.hz(),
        modality.range,
        modality.current_unit().symbol(),
        modality.final_bandwidth.bandwidth_hz(modality.sampling_rate)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edl_device::mock::MockDevice;
    use edl_protocol::{CommandId, CommandPayload};

    #[test]
    fn test_configure_stacks_then_applies_once() {
        let mut device = MockDevice::connected(5);
        let mut sequencer = CommandSequencer::new();

        configure_working_modality(&mut device, &mut sequencer, &WorkingModality::default())
            .unwrap();

        let sent: Vec<_> = device
            .commands
            .iter()
            .map(|c| (c.id, c.payload, c.apply))
            .collect();
        assert_eq!(
            sent,
            vec![
                (CommandId::SamplingRate, CommandPayload::Radio(1), false),
                (CommandId::Range, CommandPayload::Radio(0), false),
                (CommandId::FinalBandwidth, CommandPayload::Radio(0), true),
            ]
        );
    }

    #[test]
    fn test_default_unit_is_pico_amps() {
        assert_eq!(WorkingModality::default().current_unit(), CurrentUnit::PicoAmps);
    }
}
