//! 测量会话
//!
//! [`Session`] 独占持有设备会话句柄，按阶段推进状态机：
//! 连接、配置工作模式、失调补偿、加载刺激协议、采集、断开。
//! 任一阶段的致命错误都会使会话进入 `Faulted`，之后只允许断开。

use crate::acquisition::{AcquisitionLoop, AcquisitionReport};
use crate::clock::{Clock, SystemClock};
use crate::compensation::CompensationController;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::modality::configure_working_modality;
use crate::observer::ObserverSet;
use crate::protocol::ProtocolArmer;
use crate::retry::DisconnectRetrier;
use crate::sequencer::CommandSequencer;
use crate::sink::{FrameSink, RawFileSink};
use crate::state::SessionState;
use edl_device::{DeviceId, DeviceSession};
use tracing::{error, info, warn};

/// 测量会话
pub struct Session<D: DeviceSession, C: Clock = SystemClock> {
    device: D,
    clock: C,
    config: SessionConfig,
    state: SessionState,
    sequencer: CommandSequencer,
    observers: ObserverSet,
    connected: Option<DeviceId>,
}

impl<D: DeviceSession> Session<D, SystemClock> {
    /// 使用默认配置和系统时钟创建会话
    pub fn new(device: D) -> Self {
        Self::with_parts(device, SystemClock, SessionConfig::default(), ObserverSet::new())
    }
}

impl<D: DeviceSession, C: Clock> Session<D, C> {
    pub(crate) fn with_parts(
        device: D,
        clock: C,
        config: SessionConfig,
        observers: ObserverSet,
    ) -> Self {
        Self {
            device,
            clock,
            config,
            state: SessionState::Disconnected,
            sequencer: CommandSequencer::new(),
            observers,
            connected: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn observers_mut(&mut self) -> &mut ObserverSet {
        &mut self.observers
    }

    /// 当前连接的设备
    pub fn connected_device(&self) -> Option<&DeviceId> {
        self.connected.as_ref()
    }

    /// 释放会话，取回设备句柄
    pub fn into_device(self) -> D {
        self.device
    }

    /// 发现设备并连接第一个
    ///
    /// # 错误
    ///
    /// - `InvalidState`: 会话不处于 `Disconnected`
    /// - `Discovery`: 发现失败或没有任何设备，会话进入 `Faulted`
    /// - `Connect`: 连接失败，会话进入 `Faulted`
    pub fn connect_first(&mut self) -> Result<DeviceId, SessionError> {
        self.require(SessionState::Disconnected, SessionState::Connecting)?;
        self.state = SessionState::Connecting;

        let devices = match self.device.detect_devices() {
            Ok(devices) => devices,
            Err(e) => return Err(self.fault(SessionError::Discovery(e))),
        };
        let Some(first) = devices.into_iter().next() else {
            return Err(self.fault(SessionError::Discovery(edl_device::DeviceError::NotFound)));
        };
        info!("First device found: {}", first);

        if let Err(e) = self.device.connect(&first) {
            return Err(self.fault(SessionError::Connect(e)));
        }
        info!("Connected to {}", first);

        self.state = SessionState::Connected;
        self.connected = Some(first.clone());
        Ok(first)
    }

    /// 配置工作模式
    ///
    /// 采样率、量程和最终带宽一次性下发。
    ///
    /// # 错误
    ///
    /// - `InvalidState`: 会话尚未连接或已进入 `Faulted`
    /// - `Command`: 下发失败，会话进入 `Faulted`
    pub fn configure(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Connected, SessionState::Configuring)?;
        self.state = SessionState::Configuring;
        info!("Configuring working modality");

        let modality = self.config.modality;
        let result = configure_working_modality(&mut self.device, &mut self.sequencer, &modality);
        self.settle(result)
    }

    /// 执行失调补偿
    ///
    /// 驻留时间经由会话的时钟等待。
    ///
    /// # 错误
    ///
    /// - `InvalidState`: 会话尚未连接或已进入 `Faulted`
    /// - `Command`: 任一步骤下发失败，会话进入 `Faulted`
    pub fn compensate(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Connected, SessionState::Compensating)?;
        self.state = SessionState::Compensating;
        info!("Performing digital offset compensation");

        let controller = CompensationController::new(self.config.compensation);
        let result = controller.run(&mut self.device, &mut self.sequencer, &self.clock);
        self.settle(result)
    }

    /// 加载刺激协议
    ///
    /// 成功后会话进入 `Armed`。
    ///
    /// # 错误
    ///
    /// - `InvalidState`: 会话尚未连接或已进入 `Faulted`
    /// - `InvalidProtocol`: 协议参数非法，不下发任何命令，会话状态不变
    /// - `Command`: 下发失败，会话进入 `Faulted`
    pub fn arm(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Connected, SessionState::Armed)?;
        info!("Applying {:?} stimulus protocol", self.config.protocol.id());

        let armer = ProtocolArmer::new(self.config.protocol);
        let result = armer.arm(&mut self.device, &mut self.sequencer);
        self.settle(result)?;
        self.state = SessionState::Armed;
        Ok(())
    }

    /// 采集到任意 sink
    ///
    /// 状态不允许采集时，`sink` 同样会被释放。采集正常结束后会话回到 `Armed`。
    ///
    /// # 参数
    ///
    /// - `sink`: 数据帧输出，由本方法独占并在返回前 `finish`
    ///
    /// # 错误
    ///
    /// - `InvalidState`: 会话不处于 `Armed`
    /// - 其余错误见 [`AcquisitionLoop::run`]，均使会话进入 `Faulted`
    pub fn acquire<S: FrameSink>(&mut self, sink: S) -> Result<AcquisitionReport, SessionError> {
        if let Err(e) = self.require(SessionState::Armed, SessionState::Streaming) {
            if let Err(close) = sink.finish() {
                warn!("Failed to close output: {}", close);
            }
            return Err(e);
        }
        self.state = SessionState::Streaming;
        info!("Collecting data");

        let result = AcquisitionLoop::new(self.config.acquisition, &self.clock)
            .with_observers(&self.observers)
            .run(&mut self.device, sink);

        match result {
            Ok(report) => {
                self.state = SessionState::Armed;
                Ok(report)
            },
            Err(e) => Err(self.fault(e)),
        }
    }

    /// 采集到配置中的原始数据文件
    ///
    /// 文件在每次调用时被创建（或截断）。
    ///
    /// # 错误
    ///
    /// - `Sink`: 无法创建输出文件，会话进入 `Faulted`
    /// - 其余同 [`Session::acquire`]
    ///
    /// # 示例
    ///
    /// ```rust,no_run
    /// use edl_device::SimulatedDevice;
    /// use edl_driver::Session;
    ///
    /// let mut session = Session::new(SimulatedDevice::default());
    /// session.connect_first()?;
    /// session.configure()?;
    /// session.compensate()?;
    /// session.arm()?;
    /// let report = session.acquire_to_file()?;
    /// session.disconnect()?;
    /// println!("{} bytes written", report.bytes_written);
    /// # Ok::<(), edl_driver::SessionError>(())
    /// ```
    pub fn acquire_to_file(&mut self) -> Result<AcquisitionReport, SessionError> {
        self.require(SessionState::Armed, SessionState::Streaming)?;
        let path = self.config.output_path.clone();
        let sink = RawFileSink::create(&path)
            .map_err(|e| self.fault(SessionError::sink(Some(path.clone()), e)))?;
        self.acquire(sink)
    }

    /// 有界重试断开
    ///
    /// 未连接时直接返回 `Ok(0)`。`Faulted` 状态下同样允许断开。
    ///
    /// # 返回
    ///
    /// 实际断开尝试次数。
    ///
    /// # 错误
    ///
    /// - `DisconnectExhausted`: 重试预算耗尽，会话进入 `Faulted`，设备仍视为已连接
    pub fn disconnect(&mut self) -> Result<u32, SessionError> {
        if self.connected.is_none() {
            return Ok(0);
        }
        self.state = SessionState::Disconnecting;
        info!("Disconnecting");

        let retrier = DisconnectRetrier::new(self.config.disconnect);
        match retrier.disconnect(&mut self.device, &self.clock) {
            Ok(attempts) => {
                self.state = SessionState::Disconnected;
                self.connected = None;
                Ok(attempts)
            },
            Err(e) => Err(self.fault(e)),
        }
    }

    fn require(&self, expected: SessionState, next: SessionState) -> Result<(), SessionError> {
        if self.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn settle(&mut self, result: Result<(), SessionError>) -> Result<(), SessionError> {
        result.map_err(|e| self.fault(e))
    }

    fn fault(&mut self, err: SessionError) -> SessionError {
        if err.is_fatal() {
            error!("Session faulted: {}", err);
            self.state = SessionState::Faulted;
        }
        err
    }
}

impl<D: DeviceSession + std::fmt::Debug, C: Clock + std::fmt::Debug> std::fmt::Debug
    for Session<D, C>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("clock", &self.clock)
            .field("state", &self.state)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}
