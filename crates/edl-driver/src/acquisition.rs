//! 流式采集循环
//!
//! 1. 等待设备完成协议切换（settle），然后清空缓冲区中的旧数据；清空失败时不开始采集
//! 2. 在轮询次数预算和时间窗口内循环：
//!    - 查询设备状态（失败为致命错误）
//!    - 缓冲区溢出 / 数据丢失只作提示，不改变行为
//!    - 可用帧数达到最小批量阈值时读取全部可用帧并逐帧写入输出
//!    - 否则等待固定退避时间后再次轮询
//! 3. 正常结束时返回采集报告（含最后一次状态）
//!
//! 输出 sink 由循环独占，无论以何种方式退出都恰好释放一次。

use crate::clock::Clock;
use crate::error::SessionError;
use crate::observer::ObserverSet;
use crate::sink::FrameSink;
use edl_device::DeviceSession;
use edl_protocol::DeviceStatus;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 采集配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// 触发读取的最小可用帧数（静态配置，不会自适应调整）
    pub min_batch_threshold: u32,
    /// 轮询次数预算
    pub max_polls: u32,
    /// 未达阈值时的退避时间（毫秒）
    pub poll_backoff_ms: u64,
    /// 采集时间窗口（毫秒），与轮询预算先到者为准
    pub time_budget_ms: u64,
    /// 清空缓冲区前的等待时间（毫秒）
    pub settle_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            min_batch_threshold: 10,
            max_polls: 1000,
            poll_backoff_ms: 1,
            time_budget_ms: 2000,
            settle_ms: 500,
        }
    }
}

impl AcquisitionConfig {
    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms)
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// 采集结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// 轮询次数用尽
    #[default]
    PollBudget,
    /// 时间窗口用尽
    Deadline,
}

/// 采集报告
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AcquisitionReport {
    pub polls: u32,
    pub reads: u32,
    pub frames_written: u64,
    pub bytes_written: u64,
    pub partial_reads: u32,
    pub overflow_events: u32,
    pub lost_data_events: u32,
    /// 最后一次状态查询结果
    pub last_status: Option<DeviceStatus>,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

/// 采集循环
pub struct AcquisitionLoop<'a, C: Clock + ?Sized> {
    config: AcquisitionConfig,
    clock: &'a C,
    observers: Option<&'a ObserverSet>,
}

impl<'a, C: Clock + ?Sized> AcquisitionLoop<'a, C> {
    pub fn new(config: AcquisitionConfig, clock: &'a C) -> Self {
        Self {
            config,
            clock,
            observers: None,
        }
    }

    pub fn with_observers(mut self, observers: &'a ObserverSet) -> Self {
        self.observers = Some(observers);
        self
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// 运行采集并释放 `sink`
    ///
    /// 依次执行 settle 等待、清空缓冲区和轮询循环。`sink` 在任何退出路径上
    /// 都恰好 `finish` 一次，正常结束时报告中的字节数取自 `finish` 的返回值。
    ///
    /// # 参数
    ///
    /// - `device`: 已连接且已加载协议的设备会话
    /// - `sink`: 数据帧输出，由本方法独占
    ///
    /// # 错误
    ///
    /// - `Purge`: 清空缓冲区失败，此时不会查询状态
    /// - `Status`: 状态查询失败
    /// - `NotConnected` / `Read`: 读取失败
    /// - `Sink`: 写入或关闭输出失败
    ///
    /// 溢出、丢数和部分读取只记录警告并通知观察者，不会返回错误。
    ///
    /// # 示例
    ///
    /// ```rust,no_run
    /// use edl_device::{DeviceSession, SimulatedDevice};
    /// use edl_driver::{AcquisitionConfig, AcquisitionLoop, MemorySink, SystemClock};
    ///
    /// let mut device = SimulatedDevice::default();
    /// let id = device.detect_devices()?.remove(0);
    /// device.connect(&id)?;
    ///
    /// let report = AcquisitionLoop::new(AcquisitionConfig::default(), &SystemClock)
    ///     .run(&mut device, MemorySink::new())?;
    /// println!("{} frames in {} polls", report.frames_written, report.polls);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn run<D, S>(&self, device: &mut D, mut sink: S) -> Result<AcquisitionReport, SessionError>
    where
        D: DeviceSession + ?Sized,
        S: FrameSink,
    {
        let path = sink.path().map(Path::to_path_buf);
        let result = self.stream(device, &mut sink);
        let closed = sink.finish();

        match (result, closed) {
            (Ok(mut report), Ok(bytes)) => {
                report.bytes_written = bytes;
                info!(
                    "Acquisition finished: {} polls, {} reads, {} frames, {} bytes",
                    report.polls, report.reads, report.frames_written, report.bytes_written
                );
                Ok(report)
            },
            (Ok(_), Err(e)) => {
                error!("Failed to close output: {}", e);
                Err(SessionError::sink(path, e))
            },
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(close)) => {
                warn!("Failed to close output after error: {}", close);
                Err(e)
            },
        }
    }

    fn stream<D, S>(&self, device: &mut D, sink: &mut S) -> Result<AcquisitionReport, SessionError>
    where
        D: DeviceSession + ?Sized,
        S: FrameSink,
    {
        let config = &self.config;

        self.clock.sleep(config.settle());
        device.purge_data().map_err(|e| {
            error!("Failed to purge device data: {}", e);
            SessionError::Purge(e)
        })?;
        debug!("Stale samples purged");

        // 阈值为 0 时不会发起零帧读取
        let threshold = config.min_batch_threshold.max(1);
        let start = self.clock.now();
        let mut report = AcquisitionReport::default();

        while report.polls < config.max_polls {
            if self.clock.elapsed(start) >= config.time_budget() {
                report.stop_reason = StopReason::Deadline;
                info!("Acquisition time window of {} ms elapsed", config.time_budget_ms);
                break;
            }

            let status = device.device_status().map_err(|e| {
                error!("Failed to query device status: {}", e);
                SessionError::Status(e)
            })?;
            report.polls += 1;
            report.last_status = Some(status);
            trace!("Poll {}: {:?}", report.polls, status);

            if status.buffer_overflow {
                report.overflow_events += 1;
                warn!(
                    "Device buffer overflow: consider raising the minimum read threshold (currently {})",
                    threshold
                );
                self.notify(|o| o.buffer_overflow(&status));
            }
            if status.lost_data {
                report.lost_data_events += 1;
                warn!(
                    "Device lost data: reduce the sampling rate or the system load (loss may also follow a command)"
                );
                self.notify(|o| o.data_lost(&status));
            }

            if status.available_data_packets < threshold {
                self.clock.sleep(config.poll_backoff());
                continue;
            }

            let requested = status.available_data_packets;
            let outcome = match device.read_data(requested) {
                Ok(outcome) => outcome,
                Err(e) if e.is_not_connected() => {
                    error!("Device disconnected during acquisition");
                    return Err(SessionError::NotConnected);
                },
                Err(e) => {
                    error!("Failed to read device data: {}", e);
                    return Err(SessionError::Read(e));
                },
            };
            report.reads += 1;

            if outcome.is_partial() {
                report.partial_reads += 1;
                warn!(
                    "Not enough available data: requested {}, only {} frames read",
                    requested,
                    outcome.actual_count()
                );
                self.notify(|o| o.partial_read(requested, outcome.actual_count()));
            }

            for frame in outcome.batch.frames() {
                sink.write_frame(frame.values()).map_err(|e| {
                    error!("Failed to write frame: {}", e);
                    SessionError::sink(sink.path().map(Path::to_path_buf), e)
                })?;
                report.frames_written += 1;
            }
            self.notify(|o| o.batch_persisted(&outcome.batch));
        }

        report.elapsed = self.clock.elapsed(start);
        Ok(report)
    }

    fn notify(&self, f: impl FnOnce(&ObserverSet)) {
        if let Some(observers) = self.observers {
            f(observers);
        }
    }
}
