//! 模拟设备后端
//!
//! 连接后启动一个采集线程，按当前采样率生成数据帧并写入有界缓冲区：
//!
//! - 电压通道输出当前生效的刺激波形
//! - 电流通道 = 电压 / 负载电阻 + 失调 + 噪声，经一阶低通（最终带宽）后按量程单位输出
//! - 缓冲区满时丢弃最旧的帧，并置位溢出标志
//! - 采集线程落后超过 `max_catchup_frames` 时跳过积压帧，并置位丢数标志
//! - 补偿按钮按下期间，失调逐帧衰减
//!
//! 命令在设备侧暂存，`apply == true` 时按顺序全部生效。协议参数
//! （`MainTrial` / `Vhold` / `Vamp` / `TPeriod`）仅在 `ApplyProtocol` 时切换到新波形。

mod waveform;

pub use waveform::{ProtocolStage, Waveform};

use crate::{
    DeviceBackendError, DeviceBackendErrorKind, DeviceError, DeviceId, DeviceSession, ReadOutcome,
};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use edl_protocol::{
    AcquisitionBatch, ButtonState, CommandId, CommandPayload, CommandRequest, CurrentRange,
    DeviceStatus, EDL_CHANNEL_NUM, FinalBandwidth, SamplingRate, VOLTAGE_CHANNEL_INDEX,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 模拟设备配置
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// 可被发现的设备序列号
    pub serials: Vec<String>,
    /// 每帧通道数（含电压通道）
    pub channel_count: usize,
    /// 设备缓冲区容量（帧）
    pub buffer_capacity: usize,
    /// 单次追赶的最大帧数，超出部分计为丢失
    pub max_catchup_frames: u64,
    /// 连接后采集线程就绪前的延迟（ms），期间断开返回 `Busy`
    pub startup_delay_ms: u64,
    /// 采集线程的生成周期（us）
    pub tick_us: u64,
    /// 电流噪声幅度（pA，均匀分布）
    pub noise_pa: f64,
    /// 初始电流失调（pA）
    pub offset_pa: f64,
    /// 负载电阻（GΩ）
    pub load_resistance_gohm: f64,
    /// 补偿期间每帧的失调衰减系数
    pub compensation_decay: f64,
    /// 噪声随机数种子
    pub seed: u64,
    /// 断开时等待采集线程退出的时间（ms）
    pub shutdown_timeout_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            serials: vec!["EDL-SIM-0001".to_string()],
            channel_count: EDL_CHANNEL_NUM,
            buffer_capacity: 50_000,
            max_catchup_frames: 10_000,
            startup_delay_ms: 5,
            tick_us: 200,
            noise_pa: 2.0,
            offset_pa: 15.0,
            load_resistance_gohm: 1.0,
            compensation_decay: 0.999,
            seed: 0x5eed,
            shutdown_timeout_ms: 2000,
        }
    }
}

/// 已生效的设备参数（由采集线程读取）
#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveParams {
    rate: SamplingRate,
    range: CurrentRange,
    bandwidth: FinalBandwidth,
    waveform: Waveform,
    compensating: bool,
}

impl Default for ActiveParams {
    fn default() -> Self {
        Self {
            rate: SamplingRate::Khz1_25,
            range: CurrentRange::Na200,
            bandwidth: FinalBandwidth::Sr2,
            waveform: Waveform::default(),
            compensating: false,
        }
    }
}

/// 调用方与采集线程共享的状态
#[derive(Debug, Default)]
struct Shared {
    params: Mutex<ActiveParams>,
    running: AtomicBool,
    started: AtomicBool,
    buffer_overflow: AtomicBool,
    lost_data: AtomicBool,
}

/// 一条活动连接
struct Connection {
    id: DeviceId,
    shared: Arc<Shared>,
    frames: Receiver<Box<[f32]>>,
    handle: Option<JoinHandle<()>>,
    /// 设备侧暂存、尚未生效的命令
    staged: Vec<CommandRequest>,
    /// 暂存的协议参数
    protocol: ProtocolStage,
}

/// 模拟 EDL 设备
pub struct SimulatedDevice {
    config: SimConfig,
    connection: Option<Connection>,
}

impl SimulatedDevice {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// 当前连接的设备
    pub fn connected_device(&self) -> Option<&DeviceId> {
        self.connection.as_ref().map(|c| &c.id)
    }

    fn connection_mut(&mut self) -> Result<&mut Connection, DeviceError> {
        self.connection.as_mut().ok_or(DeviceError::NotConnected)
    }

    /// 让暂存命令按顺序生效
    fn apply_staged(connection: &mut Connection) {
        let mut params = connection.shared.params.lock();
        for request in connection.staged.drain(..) {
            match request {
                CommandRequest::SamplingRate(rate) => params.rate = rate,
                CommandRequest::Range(range) => params.range = range,
                CommandRequest::FinalBandwidth(bw) => params.bandwidth = bw,
                CommandRequest::MainTrial(protocol) => connection.protocol.protocol = protocol,
                CommandRequest::Vhold(mv) => connection.protocol.hold_mv = mv,
                CommandRequest::Vamp(mv) => connection.protocol.amplitude_mv = mv,
                CommandRequest::TPeriod(ms) => connection.protocol.period_ms = ms,
                CommandRequest::ApplyProtocol => {
                    params.waveform = connection.protocol.to_waveform();
                },
                CommandRequest::CompensateAll(button) => {
                    params.compensating = button == ButtonState::Pressed;
                },
            }
        }
        debug!("Simulated device parameters applied: {:?}", *params);
    }

    /// 停止采集线程并释放连接
    ///
    /// 线程在超时内未退出时保留连接和线程句柄，之后的断开会再次等待。
    fn stop(&mut self) -> Result<(), DeviceError> {
        let timeout = Duration::from_millis(self.config.shutdown_timeout_ms);
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };
        connection.shared.running.store(false, Ordering::Release);

        let mut panicked = false;
        if let Some(handle) = connection.handle.take() {
            match handle.join_timeout(timeout) {
                Ok(joined) => panicked = joined.is_err(),
                Err(handle) => {
                    connection.handle = Some(handle);
                    warn!("Simulated acquisition thread still running after {:?}", timeout);
                    return Err(DeviceBackendError::new(
                        DeviceBackendErrorKind::Backend,
                        "acquisition thread failed to shut down",
                    )
                    .into());
                },
            }
        }

        if let Some(connection) = self.connection.take() {
            info!("Simulated device {} disconnected", connection.id);
        }
        if panicked {
            return Err(DeviceBackendError::new(
                DeviceBackendErrorKind::Backend,
                "acquisition thread panicked",
            )
            .into());
        }
        Ok(())
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl DeviceSession for SimulatedDevice {
    fn detect_devices(&mut self) -> Result<Vec<DeviceId>, DeviceError> {
        if self.config.serials.is_empty() {
            return Err(DeviceError::NotFound);
        }
        Ok(self.config.serials.iter().map(DeviceId::new).collect())
    }

    fn connect(&mut self, device: &DeviceId) -> Result<(), DeviceError> {
        if self.connection.is_some() {
            return Err(DeviceError::AlreadyConnected);
        }
        if !self.config.serials.iter().any(|s| s == device.as_str()) {
            return Err(DeviceError::NotFound);
        }

        let capacity = self.config.buffer_capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let shared = Arc::new(Shared::default());
        shared.running.store(true, Ordering::Release);

        let generator = Generator::new(self.config.clone(), shared.clone(), tx, rx.clone());
        let handle = std::thread::Builder::new()
            .name("edl-sim-acq".to_string())
            .spawn(move || generator.run())?;

        info!("Simulated device {} connected", device);
        self.connection = Some(Connection {
            id: device.clone(),
            shared,
            frames: rx,
            handle: Some(handle),
            staged: Vec::new(),
            protocol: ProtocolStage::default(),
        });
        Ok(())
    }

    fn set_command(
        &mut self,
        id: CommandId,
        payload: CommandPayload,
        apply: bool,
    ) -> Result<(), DeviceError> {
        let connection = self.connection_mut()?;
        let request = CommandRequest::from_parts(id, payload)?;
        trace!("Simulated device staged {:?} (apply={})", request, apply);
        connection.staged.push(request);
        if apply {
            Self::apply_staged(connection);
        }
        Ok(())
    }

    fn purge_data(&mut self) -> Result<(), DeviceError> {
        let connection = self.connection_mut()?;
        let purged = connection.frames.try_iter().count();
        debug!("Simulated device purged {} frames", purged);
        Ok(())
    }

    fn device_status(&mut self) -> Result<DeviceStatus, DeviceError> {
        let connection = self.connection_mut()?;
        let available = u32::try_from(connection.frames.len()).unwrap_or(u32::MAX);
        Ok(DeviceStatus::new(available)
            .with_buffer_overflow(connection.shared.buffer_overflow.swap(false, Ordering::AcqRel))
            .with_lost_data(connection.shared.lost_data.swap(false, Ordering::AcqRel)))
    }

    fn read_data(&mut self, requested: u32) -> Result<ReadOutcome, DeviceError> {
        let channel_count = self.config.channel_count;
        let connection = self.connection_mut()?;

        let mut batch = AcquisitionBatch::empty(channel_count);
        for frame in connection.frames.try_iter().take(requested as usize) {
            batch.push_frame(&frame)?;
        }

        if (batch.frame_count() as u64) < u64::from(requested) {
            Ok(ReadOutcome::insufficient(requested, batch))
        } else {
            Ok(ReadOutcome::complete(batch))
        }
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        let Some(connection) = self.connection.as_ref() else {
            debug!("Simulated device already disconnected");
            return Ok(());
        };
        if !connection.shared.started.load(Ordering::Acquire) {
            return Err(DeviceError::Busy);
        }
        self.stop()
    }

    fn channel_count(&self) -> usize {
        self.config.channel_count
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Simulated device shutdown failed: {}", e);
        }
    }
}

/// 采集线程
struct Generator {
    config: SimConfig,
    shared: Arc<Shared>,
    tx: Sender<Box<[f32]>>,
    /// 缓冲区满时用于丢弃最旧帧
    oldest: Receiver<Box<[f32]>>,
    rng: StdRng,
    /// 波形时间（s）
    t_s: f64,
    offset_pa: f64,
    /// 各电流通道的低通状态（pA）
    filtered: Vec<f64>,
}

impl Generator {
    fn new(
        config: SimConfig,
        shared: Arc<Shared>,
        tx: Sender<Box<[f32]>>,
        oldest: Receiver<Box<[f32]>>,
    ) -> Self {
        let current_channels = config.channel_count.saturating_sub(1);
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            offset_pa: config.offset_pa,
            filtered: vec![config.offset_pa; current_channels],
            t_s: 0.0,
            config,
            shared,
            tx,
            oldest,
        }
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn run(mut self) {
        let tick = Duration::from_micros(self.config.tick_us.max(1));
        let startup = Duration::from_millis(self.config.startup_delay_ms);

        let boot = Instant::now();
        while self.is_running() && boot.elapsed() < startup {
            spin_sleep::sleep(tick);
        }
        self.shared.started.store(true, Ordering::Release);
        trace!("Simulated acquisition thread started");

        let mut params = *self.shared.params.lock();
        let mut origin = Instant::now();
        let mut produced: u64 = 0;

        while self.is_running() {
            spin_sleep::sleep(tick);

            let latest = *self.shared.params.lock();
            if latest.rate != params.rate {
                origin = Instant::now();
                produced = 0;
            }
            params = latest;

            let due = (origin.elapsed().as_secs_f64() * params.rate.hz()) as u64;
            let mut backlog = due.saturating_sub(produced);
            if backlog > self.config.max_catchup_frames {
                let skipped = backlog - self.config.max_catchup_frames;
                warn!("Simulated acquisition fell behind, {} frames lost", skipped);
                self.shared.lost_data.store(true, Ordering::Release);
                produced += skipped;
                self.t_s += skipped as f64 / params.rate.hz();
                backlog = self.config.max_catchup_frames;
            }

            for _ in 0..backlog {
                let frame = self.next_frame(&params);
                self.push(frame);
            }
            produced += backlog;
        }
        trace!("Simulated acquisition thread stopped");
    }

    fn next_frame(&mut self, params: &ActiveParams) -> Box<[f32]> {
        let fs = params.rate.hz();
        let fc = params.bandwidth.bandwidth_hz(params.rate);
        let alpha = 1.0 - (-2.0 * std::f64::consts::PI * fc / fs).exp();

        if params.compensating {
            self.offset_pa *= self.config.compensation_decay;
        }

        let voltage_mv = params.waveform.voltage_mv(self.t_s);
        let resistance = self.config.load_resistance_gohm.max(f64::MIN_POSITIVE);
        let ideal_pa = voltage_mv / resistance + self.offset_pa;
        let unit = params.range.unit();

        let mut frame = vec![0.0f32; self.config.channel_count];
        if let Some(v) = frame.get_mut(VOLTAGE_CHANNEL_INDEX) {
            *v = voltage_mv as f32;
        }
        for (ch, state) in self.filtered.iter_mut().enumerate() {
            let noise = if self.config.noise_pa > 0.0 {
                self.rng.gen_range(-self.config.noise_pa..self.config.noise_pa)
            } else {
                0.0
            };
            *state += alpha * (ideal_pa + noise - *state);
            frame[VOLTAGE_CHANNEL_INDEX + 1 + ch] = unit.from_pa(*state) as f32;
        }

        self.t_s += 1.0 / fs;
        frame.into_boxed_slice()
    }

    /// 写入缓冲区；满时丢弃最旧帧
    fn push(&self, frame: Box<[f32]>) {
        let mut pending = frame;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(frame)) => {
                    self.shared.buffer_overflow.store(true, Ordering::Release);
                    let _ = self.oldest.try_recv();
                    pending = frame;
                },
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// 带超时的线程 join
trait JoinTimeout: Sized {
    /// 超时内线程结束时返回 join 结果，否则交还句柄
    fn join_timeout(self, timeout: Duration) -> Result<std::thread::Result<()>, Self>;
}

impl<T> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<std::thread::Result<()>, Self> {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return Err(self);
            }
            spin_sleep::sleep(Duration::from_millis(1));
        }
        Ok(self.join().map(|_| ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> SimConfig {
        SimConfig {
            startup_delay_ms: 0,
            tick_us: 100,
            noise_pa: 0.0,
            ..SimConfig::default()
        }
    }

    fn wait_started(device: &SimulatedDevice) {
        let connection = device.connection.as_ref().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !connection.shared.started.load(Ordering::Acquire) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn wait_available(device: &mut SimulatedDevice, frames: u32) -> DeviceStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = device.device_status().unwrap();
            if status.available_data_packets >= frames || Instant::now() > deadline {
                return status;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_detect_and_unknown_device() {
        let mut device = SimulatedDevice::new(fast_config());
        let ids = device.detect_devices().unwrap();
        assert_eq!(ids, vec![DeviceId::new("EDL-SIM-0001")]);

        assert!(matches!(
            device.connect(&DeviceId::new("nope")),
            Err(DeviceError::NotFound)
        ));

        let mut none = SimulatedDevice::new(SimConfig {
            serials: vec![],
            ..fast_config()
        });
        assert!(matches!(none.detect_devices(), Err(DeviceError::NotFound)));
    }

    #[test]
    fn test_operations_require_connection() {
        let mut device = SimulatedDevice::new(fast_config());
        assert!(device.device_status().unwrap_err().is_not_connected());
        assert!(device.read_data(10).unwrap_err().is_not_connected());
        assert!(device.purge_data().unwrap_err().is_not_connected());
        assert!(
            device
                .set_command(CommandId::ApplyProtocol, CommandPayload::Empty, true)
                .unwrap_err()
                .is_not_connected()
        );
        assert!(device.disconnect().is_ok());
    }

    #[test]
    fn test_stream_and_read() {
        let mut device = SimulatedDevice::new(fast_config());
        let id = device.detect_devices().unwrap().remove(0);
        device.connect(&id).unwrap();
        assert!(matches!(device.connect(&id), Err(DeviceError::AlreadyConnected)));

        let status = wait_available(&mut device, 20);
        assert!(status.available_data_packets >= 20);

        let outcome = device.read_data(20).unwrap();
        assert!(!outcome.is_partial());
        assert_eq!(outcome.actual_count(), 20);
        assert_eq!(outcome.batch.channel_count(), EDL_CHANNEL_NUM);

        device.purge_data().unwrap();
        let outcome = device.read_data(1_000_000).unwrap();
        assert!(outcome.is_partial());

        wait_started(&device);
        device.disconnect().unwrap();
        assert!(!device.is_connected());
    }

    #[test]
    fn test_protocol_applies_only_on_apply_protocol() {
        let mut device = SimulatedDevice::new(fast_config());
        let id = device.detect_devices().unwrap().remove(0);
        device.connect(&id).unwrap();

        device
            .set_command(CommandId::Vhold, CommandPayload::Value(40.0), true)
            .unwrap();
        let params = *device.connection.as_ref().unwrap().shared.params.lock();
        assert_eq!(params.waveform, Waveform::Constant { hold_mv: 0.0 });

        device
            .set_command(CommandId::ApplyProtocol, CommandPayload::Empty, true)
            .unwrap();
        let params = *device.connection.as_ref().unwrap().shared.params.lock();
        assert_eq!(params.waveform, Waveform::Constant { hold_mv: 40.0 });
    }

    #[test]
    fn test_stacked_commands_wait_for_apply() {
        let mut device = SimulatedDevice::new(fast_config());
        let id = device.detect_devices().unwrap().remove(0);
        device.connect(&id).unwrap();

        device
            .set_command(
                CommandId::SamplingRate,
                CommandPayload::Radio(SamplingRate::Khz5.into()),
                false,
            )
            .unwrap();
        let params = *device.connection.as_ref().unwrap().shared.params.lock();
        assert_eq!(params.rate, SamplingRate::Khz1_25);

        device
            .set_command(
                CommandId::Range,
                CommandPayload::Radio(CurrentRange::Pa200.into()),
                true,
            )
            .unwrap();
        let params = *device.connection.as_ref().unwrap().shared.params.lock();
        assert_eq!(params.rate, SamplingRate::Khz5);
        assert_eq!(params.range, CurrentRange::Pa200);
    }

    #[test]
    fn test_overflow_latches_and_resets() {
        let mut device = SimulatedDevice::new(SimConfig {
            buffer_capacity: 8,
            ..fast_config()
        });
        let id = device.detect_devices().unwrap().remove(0);
        device.connect(&id).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while Instant::now() < deadline {
            let status = device.device_status().unwrap();
            assert!(status.available_data_packets <= 8);
            if status.buffer_overflow {
                seen = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(seen);
    }

    #[test]
    fn test_rejects_malformed_command() {
        let mut device = SimulatedDevice::new(fast_config());
        let id = device.detect_devices().unwrap().remove(0);
        device.connect(&id).unwrap();
        let err = device
            .set_command(CommandId::Range, CommandPayload::Value(1.0), true)
            .unwrap_err();
        assert!(matches!(err, DeviceError::Protocol(_)));
    }

    #[test]
    fn test_disconnect_busy_while_starting() {
        let mut device = SimulatedDevice::new(SimConfig {
            startup_delay_ms: 10_000,
            ..fast_config()
        });
        let id = device.detect_devices().unwrap().remove(0);
        device.connect(&id).unwrap();
        assert!(matches!(device.disconnect(), Err(DeviceError::Busy)));
        // Drop 会停止仍在启动的线程
    }

    #[test]
    fn test_disconnect_keeps_connection_until_thread_exits() {
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let (_frame_tx, frames) = crossbeam_channel::bounded(1);
        let shared = Arc::new(Shared::default());
        shared.started.store(true, Ordering::Release);
        // 忽略 running 标志的线程，直到被显式释放
        let handle = std::thread::spawn(move || {
            let _ = release_rx.recv();
        });

        let mut device = SimulatedDevice::new(SimConfig {
            shutdown_timeout_ms: 20,
            ..fast_config()
        });
        device.connection = Some(Connection {
            id: DeviceId::new("EDL-SIM-0001"),
            shared,
            frames,
            handle: Some(handle),
            staged: Vec::new(),
            protocol: ProtocolStage::default(),
        });

        assert!(matches!(device.disconnect(), Err(DeviceError::Backend(_))));
        assert!(device.is_connected());
        assert!(matches!(device.disconnect(), Err(DeviceError::Backend(_))));
        assert!(device.is_connected());

        release_tx.send(()).unwrap();
        device.config.shutdown_timeout_ms = 5_000;
        device.disconnect().unwrap();
        assert!(!device.is_connected());
        assert!(device.disconnect().is_ok());
    }
}
