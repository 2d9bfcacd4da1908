//! 脚本化 Mock 设备
//!
//! 按预设脚本返回状态和读取结果，并记录上层发出的每一次调用，
//! 用于在无硬件、无线程的条件下验证编排逻辑。
//!
//! 生成的数据帧内容是确定的：第 `n` 个帧（全局序号）的第 `ch` 个通道值为
//! `n * 10 + ch`，因此可以据此检查帧的写入顺序。

use crate::{
    DeviceBackendError, DeviceBackendErrorKind, DeviceError, DeviceId, DeviceSession, ReadOutcome,
};
use edl_protocol::{AcquisitionBatch, CommandId, CommandPayload, DeviceStatus};
use std::collections::VecDeque;

/// 一条已下发到设备的命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentCommand {
    pub id: CommandId,
    pub payload: CommandPayload,
    pub apply: bool,
}

/// 预设的状态查询结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockStatus {
    Ok(DeviceStatus),
    Fail,
}

/// 预设的读取结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockRead {
    /// 返回请求的全部帧
    Complete,
    /// 只返回指定帧数，并报告数据不足
    Partial(u32),
    /// 报告设备未连接
    NotConnected,
}

/// 脚本化 Mock 设备
#[derive(Debug)]
pub struct MockDevice {
    channel_count: usize,
    devices: Vec<DeviceId>,
    fail_connect: bool,
    fail_purge: bool,
    fail_command: Option<CommandId>,
    statuses: VecDeque<MockStatus>,
    reads: VecDeque<MockRead>,
    disconnect_failures: u32,
    connected: bool,
    next_frame: u64,

    /// 已下发的命令（按到达顺序）
    pub commands: Vec<SentCommand>,
    /// 清空调用次数
    pub purges: usize,
    /// 状态查询次数
    pub status_queries: usize,
    /// 每次读取请求的帧数
    pub read_requests: Vec<u32>,
    /// 断开尝试次数
    pub disconnect_attempts: u32,
}

impl MockDevice {
    /// 创建一个带单个设备 `MOCK-0001` 的 Mock
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count,
            devices: vec![DeviceId::new("MOCK-0001")],
            fail_connect: false,
            fail_purge: false,
            fail_command: None,
            statuses: VecDeque::new(),
            reads: VecDeque::new(),
            disconnect_failures: 0,
            connected: false,
            next_frame: 0,
            commands: Vec::new(),
            purges: 0,
            status_queries: 0,
            read_requests: Vec::new(),
            disconnect_attempts: 0,
        }
    }

    /// 已处于连接状态的 Mock
    pub fn connected(channel_count: usize) -> Self {
        let mut device = Self::new(channel_count);
        device.connected = true;
        device
    }

    pub fn without_devices(mut self) -> Self {
        self.devices.clear();
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_purge(mut self) -> Self {
        self.fail_purge = true;
        self
    }

    /// 下发指定命令时失败
    pub fn failing_command(mut self, id: CommandId) -> Self {
        self.fail_command = Some(id);
        self
    }

    /// 预设状态序列；脚本耗尽后返回 0 可用帧
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = MockStatus>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    /// 预设读取序列；脚本耗尽后按 `Complete` 处理
    pub fn with_reads(mut self, reads: impl IntoIterator<Item = MockRead>) -> Self {
        self.reads.extend(reads);
        self
    }

    /// 前 `count` 次断开返回 `Busy`
    pub fn with_disconnect_failures(mut self, count: u32) -> Self {
        self.disconnect_failures = count;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// 生成 `frames` 个确定性数据帧
    fn make_batch(&mut self, frames: u32) -> AcquisitionBatch {
        let mut samples = Vec::with_capacity(frames as usize * self.channel_count);
        for _ in 0..frames {
            let base = self.next_frame as f32 * 10.0;
            for ch in 0..self.channel_count {
                samples.push(base + ch as f32);
            }
            self.next_frame += 1;
        }
        AcquisitionBatch::new(self.channel_count, samples)
            .unwrap_or_else(|_| AcquisitionBatch::empty(self.channel_count))
    }

    fn scripted_failure(message: &str) -> DeviceError {
        DeviceError::Backend(DeviceBackendError::new(
            DeviceBackendErrorKind::Backend,
            message,
        ))
    }
}

impl DeviceSession for MockDevice {
    fn detect_devices(&mut self) -> Result<Vec<DeviceId>, DeviceError> {
        if self.devices.is_empty() {
            return Err(DeviceError::NotFound);
        }
        Ok(self.devices.clone())
    }

    fn connect(&mut self, device: &DeviceId) -> Result<(), DeviceError> {
        if self.fail_connect {
            return Err(Self::scripted_failure("scripted connect failure"));
        }
        if !self.devices.contains(device) {
            return Err(DeviceError::NotFound);
        }
        self.connected = true;
        Ok(())
    }

    fn set_command(
        &mut self,
        id: CommandId,
        payload: CommandPayload,
        apply: bool,
    ) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        if self.fail_command == Some(id) {
            return Err(Self::scripted_failure("scripted command failure"));
        }
        self.commands.push(SentCommand { id, payload, apply });
        Ok(())
    }

    fn purge_data(&mut self) -> Result<(), DeviceError> {
        self.purges += 1;
        if self.fail_purge {
            return Err(Self::scripted_failure("scripted purge failure"));
        }
        Ok(())
    }

    fn device_status(&mut self) -> Result<DeviceStatus, DeviceError> {
        self.status_queries += 1;
        match self.statuses.pop_front() {
            Some(MockStatus::Ok(status)) => Ok(status),
            Some(MockStatus::Fail) => Err(Self::scripted_failure("scripted status failure")),
            None => Ok(DeviceStatus::default()),
        }
    }

    fn read_data(&mut self, requested: u32) -> Result<ReadOutcome, DeviceError> {
        self.read_requests.push(requested);
        match self.reads.pop_front().unwrap_or(MockRead::Complete) {
            MockRead::Complete => Ok(ReadOutcome::complete(self.make_batch(requested))),
            MockRead::Partial(actual) => {
                let batch = self.make_batch(actual.min(requested));
                Ok(ReadOutcome::insufficient(requested, batch))
            },
            MockRead::NotConnected => Err(DeviceError::NotConnected),
        }
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.disconnect_attempts += 1;
        if self.disconnect_attempts <= self.disconnect_failures {
            return Err(DeviceError::Busy);
        }
        self.connected = false;
        Ok(())
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_detect_and_connect() {
        let mut device = MockDevice::new(5);
        let ids = device.detect_devices().unwrap();
        assert_eq!(ids.len(), 1);
        device.connect(&ids[0]).unwrap();
        assert!(device.is_connected());

        let mut empty = MockDevice::new(5).without_devices();
        assert!(matches!(empty.detect_devices(), Err(DeviceError::NotFound)));
    }

    #[test]
    fn test_mock_deterministic_frames() {
        let mut device = MockDevice::connected(3);
        let first = device.read_data(2).unwrap();
        assert_eq!(first.batch.as_samples(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);

        let second = device.read_data(1).unwrap();
        assert_eq!(second.batch.as_samples(), &[20.0, 21.0, 22.0]);
        assert_eq!(device.read_requests, vec![2, 1]);
    }

    #[test]
    fn test_mock_scripted_reads() {
        let mut device = MockDevice::connected(2)
            .with_reads([MockRead::Partial(3), MockRead::NotConnected]);

        let outcome = device.read_data(10).unwrap();
        assert!(outcome.is_partial());
        assert_eq!(outcome.actual_count(), 3);

        assert!(device.read_data(10).unwrap_err().is_not_connected());
    }

    #[test]
    fn test_mock_disconnect_failures() {
        let mut device = MockDevice::connected(2).with_disconnect_failures(2);
        assert!(matches!(device.disconnect(), Err(DeviceError::Busy)));
        assert!(matches!(device.disconnect(), Err(DeviceError::Busy)));
        assert!(device.disconnect().is_ok());
        assert_eq!(device.disconnect_attempts, 3);
        assert!(!device.is_connected());
    }
}
