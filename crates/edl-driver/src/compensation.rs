//! 数字失调补偿
//!
//! 固定的定时序列：
//!
//! 1. 选择基线刺激条件（恒定电位协议），保持电位归零，下发
//! 2. 按下补偿按钮，下发
//! 3. 驻留固定时长（不可取消）
//! 4. 松开补偿按钮，下发
//!
//! 任一步骤失败都会立即返回错误；按下失败时不再驻留。
//! 驻留后松开失败同样是致命的，因为设备可能仍处于补偿状态。

use crate::clock::Clock;
use crate::error::SessionError;
use crate::sequencer::CommandSequencer;
use edl_device::DeviceSession;
use edl_protocol::{ButtonState, CommandRequest, ProtocolId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// 补偿配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompensationConfig {
    /// 补偿驻留时长（毫秒）
    pub dwell_ms: u64,
    /// 补偿期间的保持电位（mV）
    pub hold_level_mv: f64,
}

impl Default for CompensationConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 5000,
            hold_level_mv: 0.0,
        }
    }
}

impl CompensationConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

/// 补偿控制器
#[derive(Debug, Clone, Copy, Default)]
pub struct CompensationController {
    config: CompensationConfig,
}

impl CompensationController {
    pub fn new(config: CompensationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompensationConfig {
        &self.config
    }

    /// 执行补偿序列
    pub fn run<D, C>(
        &self,
        device: &mut D,
        sequencer: &mut CommandSequencer,
        clock: &C,
    ) -> Result<(), SessionError>
    where
        D: DeviceSession + ?Sized,
        C: Clock + ?Sized,
    {
        sequencer.submit(
            device,
            &[
                CommandRequest::MainTrial(ProtocolId::Constant),
                CommandRequest::Vhold(self.config.hold_level_mv),
                CommandRequest::ApplyProtocol,
            ],
        )?;
        debug!("Baseline condition applied");

        sequencer.stack_and_apply(device, CommandRequest::CompensateAll(ButtonState::Pressed))?;
        info!("Compensating digital offset for {} ms", self.config.dwell_ms);

        clock.sleep(self.config.dwell());

        sequencer.stack_and_apply(device, CommandRequest::CompensateAll(ButtonState::Released))?;
        info!("Offset compensation complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use edl_device::mock::MockDevice;
    use edl_protocol::{CommandId, CommandPayload};

    #[test]
    fn test_compensation_sequence() {
        let mut device = MockDevice::connected(5);
        let mut sequencer = CommandSequencer::new();
        let clock = ManualClock::new();

        CompensationController::default()
            .run(&mut device, &mut sequencer, &clock)
            .unwrap();

        let sent: Vec<_> = device
            .commands
            .iter()
            .map(|c| (c.id, c.payload, c.apply))
            .collect();
        assert_eq!(
            sent,
            vec![
                (CommandId::MainTrial, CommandPayload::Value(0.0), false),
                (CommandId::Vhold, CommandPayload::Value(0.0), false),
                (CommandId::ApplyProtocol, CommandPayload::Empty, true),
                (
                    CommandId::CompAll,
                    CommandPayload::Button(ButtonState::Pressed),
                    true
                ),
                (
                    CommandId::CompAll,
                    CommandPayload::Button(ButtonState::Released),
                    true
                ),
            ]
        );
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(5000)]);
    }

    #[test]
    fn test_arm_failure_skips_dwell() {
        let mut device = MockDevice::connected(5).failing_command(CommandId::CompAll);
        let mut sequencer = CommandSequencer::new();
        let clock = ManualClock::new();

        let err = CompensationController::default()
            .run(&mut device, &mut sequencer, &clock)
            .unwrap_err();

        assert!(matches!(err, SessionError::Command(_)));
        assert_eq!(clock.sleep_count(), 0);
    }
}
