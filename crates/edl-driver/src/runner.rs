//! 固定测量流程
//!
//! 连接第一个设备 → 配置工作模式 → 失调补偿 → 加载刺激协议
//! → 采集到原始数据文件 → 有界重试断开。

use crate::acquisition::AcquisitionReport;
use crate::clock::Clock;
use crate::error::SessionError;
use crate::session::Session;
use edl_device::{DeviceId, DeviceSession};
use tracing::{info, warn};

/// 一次完整测量的结果
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementReport {
    pub device: DeviceId,
    pub acquisition: AcquisitionReport,
    pub disconnect_attempts: u32,
}

/// 运行固定测量流程
///
/// 连接建立后的任何致命错误都会先尝试断开设备，再返回原始错误；
/// 断开本身失败只记录日志。
pub fn run_measurement<D, C>(session: &mut Session<D, C>) -> Result<MeasurementReport, SessionError>
where
    D: DeviceSession,
    C: Clock,
{
    let device = session.connect_first()?;

    let acquisition = match run_connected(session) {
        Ok(report) => report,
        Err(e) => {
            if let Err(teardown) = session.disconnect() {
                warn!("Teardown after failure did not complete: {}", teardown);
            }
            return Err(e);
        },
    };

    let disconnect_attempts = session.disconnect()?;
    info!("Measurement complete");

    Ok(MeasurementReport {
        device,
        acquisition,
        disconnect_attempts,
    })
}

fn run_connected<D, C>(session: &mut Session<D, C>) -> Result<AcquisitionReport, SessionError>
where
    D: DeviceSession,
    C: Clock,
{
    session.configure()?;
    session.compensate()?;
    session.arm()?;
    session.acquire_to_file()
}
