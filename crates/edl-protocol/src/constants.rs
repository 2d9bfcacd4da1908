//! 协议常量定义

/// 默认通道数：1 个电压通道 + 4 个电流通道
pub const EDL_CHANNEL_NUM: usize = 5;

/// 电压通道在数据帧中的索引
pub const VOLTAGE_CHANNEL_INDEX: usize = 0;

/// 单个采样值的字节数（f32）
pub const SAMPLE_SIZE_BYTES: usize = std::mem::size_of::<f32>();

/// 计算 `frames` 个数据帧在原始文件中占用的字节数
///
/// 溢出时饱和到 `usize::MAX`。
pub const fn frame_bytes(frames: usize, channel_count: usize) -> usize {
    frames
        .saturating_mul(channel_count)
        .saturating_mul(SAMPLE_SIZE_BYTES)
}
