//! 数据帧布局
//!
//! 一个数据帧（packet）是一个采样时刻所有通道的值，定宽、按通道顺序排列：
//!
//! ```text
//! [V (mV)] [I1] [I2] ... [I(n-1)]
//! ```
//!
//! [`AcquisitionBatch`] 把一次读取返回的多个帧以扁平的 `Vec<f32>` 存放
//! （帧优先，帧内按通道顺序），并保证长度是通道数的整数倍。

use crate::{ProtocolError, VOLTAGE_CHANNEL_INDEX};

/// 单个数据帧（借用视图）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataFrame<'a> {
    values: &'a [f32],
}

impl<'a> DataFrame<'a> {
    /// 电压通道（mV）
    pub fn voltage_mv(&self) -> f32 {
        self.values[VOLTAGE_CHANNEL_INDEX]
    }

    /// 电流通道（单位取决于量程）
    pub fn currents(&self) -> &'a [f32] {
        &self.values[VOLTAGE_CHANNEL_INDEX + 1..]
    }

    /// 全部通道值
    pub fn values(&self) -> &'a [f32] {
        self.values
    }

    pub fn channel_count(&self) -> usize {
        self.values.len()
    }
}

/// 一次读取返回的数据帧序列
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AcquisitionBatch {
    channel_count: usize,
    samples: Vec<f32>,
}

impl AcquisitionBatch {
    /// 从扁平采样数组构建批次
    ///
    /// # 错误
    /// - `InvalidChannelCount`: 通道数为 0
    /// - `InvalidBatchLayout`: 采样数不是通道数的整数倍
    pub fn new(channel_count: usize, samples: Vec<f32>) -> Result<Self, ProtocolError> {
        if channel_count == 0 {
            return Err(ProtocolError::InvalidChannelCount(channel_count));
        }
        if samples.len() % channel_count != 0 {
            return Err(ProtocolError::InvalidBatchLayout {
                len: samples.len(),
                channel_count,
            });
        }
        Ok(Self {
            channel_count,
            samples,
        })
    }

    /// 创建空批次
    pub fn empty(channel_count: usize) -> Self {
        Self {
            channel_count,
            samples: Vec::new(),
        }
    }

    /// 追加一个帧
    pub fn push_frame(&mut self, frame: &[f32]) -> Result<(), ProtocolError> {
        if frame.len() != self.channel_count {
            return Err(ProtocolError::InvalidBatchLayout {
                len: frame.len(),
                channel_count: self.channel_count,
            });
        }
        self.samples.extend_from_slice(frame);
        Ok(())
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// 帧数
    pub fn frame_count(&self) -> usize {
        if self.channel_count == 0 {
            0
        } else {
            self.samples.len() / self.channel_count
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 第 `index` 个帧
    ///
    /// 越界（包括索引乘以通道数溢出）时返回 `None`。
    pub fn frame(&self, index: usize) -> Option<DataFrame<'_>> {
        let start = index.checked_mul(self.channel_count)?;
        let end = start.checked_add(self.channel_count)?;
        let values = self.samples.get(start..end)?;
        Some(DataFrame { values })
    }

    /// 按到达顺序遍历帧
    pub fn frames(&self) -> impl ExactSizeIterator<Item = DataFrame<'_>> + '_ {
        self.samples
            .chunks_exact(self.channel_count.max(1))
            .map(|values| DataFrame { values })
    }

    /// 扁平采样数组（帧优先，帧内按通道顺序）
    pub fn as_samples(&self) -> &[f32] {
        &self.samples
    }
}
