//! # EDL Caller
//!
//! 固定流程的测量程序，不接受命令行参数：
//!
//! 1. 连接第一个发现的设备
//! 2. 配置工作模式（5 kHz、200 pA、SR/2）
//! 3. 数字失调补偿
//! 4. 加载三角波协议
//! 5. 采集数据到 `data.dat`
//! 6. 断开设备
//!
//! 成功时退出码为 0，任何致命错误时为非 0。
//!
//! 日志级别通过 `RUST_LOG` 调整，例如 `RUST_LOG=edl_driver=debug`。

use anyhow::{Context, Result};
use edl_device::SimulatedDevice;
use edl_driver::{SessionBuilder, SessionConfig, run_measurement};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("failed to initialise logging: {e:#}");
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        },
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("edl_caller=info".parse()?)
                .add_directive("edl_driver=info".parse()?)
                .add_directive("edl_device=info".parse()?),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

fn run() -> Result<()> {
    let config = SessionConfig::default();
    let output = config.output_path.clone();

    let mut session = SessionBuilder::new(SimulatedDevice::default())
        .config(config)
        .build()
        .context("invalid session configuration")?;

    let report = run_measurement(&mut session).context("measurement failed")?;

    let acquisition = &report.acquisition;
    info!(
        "{}: {} frames ({} bytes) written to {} in {} polls",
        report.device,
        acquisition.frames_written,
        acquisition.bytes_written,
        output.display(),
        acquisition.polls
    );
    if acquisition.overflow_events > 0 || acquisition.lost_data_events > 0 {
        info!(
            "Degraded performance: {} overflow events, {} data-loss events",
            acquisition.overflow_events, acquisition.lost_data_events
        );
    }
    Ok(())
}
