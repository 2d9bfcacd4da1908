//! 设备状态快照

/// 设备状态
///
/// 由设备会话在每次状态查询时返回的快照。两个标志均为提示性质，
/// 不代表致命错误，且可能同时出现。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatus {
    /// 设备侧缓冲区中可读取的数据帧数
    pub available_data_packets: u32,
    /// 设备侧缓冲区溢出：最旧的未读数据已被丢弃
    pub buffer_overflow: bool,
    /// 数据在进入缓冲区之前已丢失（与缓冲区容量无关）
    pub lost_data: bool,
}

impl DeviceStatus {
    pub fn new(available_data_packets: u32) -> Self {
        Self {
            available_data_packets,
            ..Self::default()
        }
    }

    pub fn with_buffer_overflow(mut self, flag: bool) -> Self {
        self.buffer_overflow = flag;
        self
    }

    pub fn with_lost_data(mut self, flag: bool) -> Self {
        self.lost_data = flag;
        self
    }
}
