//! 数据帧输出
//!
//! 原始二进制格式：本机字节序的 `f32`，无文件头、无长度前缀、无分隔符；
//! 帧优先，帧内按通道顺序排列。
//!
//! 每个帧先编码到暂存缓冲区，再以一次 `write_all` 交给 `BufWriter`。
//! 写入失败时 `BufWriter` 可能已经把该帧的一部分刷到文件里，
//! 此时文件末尾会残留不完整的帧；[`read_raw_samples`] 会把这种文件当作 `InvalidData` 拒绝。

use edl_protocol::{AcquisitionBatch, SAMPLE_SIZE_BYTES, frame_bytes};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// 数据帧输出接口
///
/// `finish` 消耗 sink，保证每条退出路径上恰好释放一次。
pub trait FrameSink {
    /// 追加一个完整的帧
    fn write_frame(&mut self, frame: &[f32]) -> io::Result<()>;

    /// 已写入的字节数
    fn bytes_written(&self) -> u64;

    /// 刷新并关闭，返回写入的总字节数
    fn finish(self) -> io::Result<u64>
    where
        Self: Sized;

    /// 输出路径（如果有）
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// 原始二进制文件输出
#[derive(Debug)]
pub struct RawFileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    scratch: Vec<u8>,
    bytes: u64,
}

impl RawFileSink {
    /// 创建（或截断）输出文件
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        debug!("Opened raw output file {:?}", path);
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            scratch: Vec::new(),
            bytes: 0,
        })
    }
}

impl FrameSink for RawFileSink {
    /// 追加一个帧
    ///
    /// # 错误
    /// 返回底层 I/O 错误。出错时 `bytes_written` 不计入该帧，
    /// 但文件中可能已经有该帧的前缀字节。
    fn write_frame(&mut self, frame: &[f32]) -> io::Result<()> {
        encode_frame(frame, &mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.bytes += self.scratch.len() as u64;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }

    fn finish(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        debug!("Closed raw output file {:?} ({} bytes)", self.path, self.bytes);
        Ok(self.bytes)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

fn encode_frame(frame: &[f32], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(frame_bytes(1, frame.len()));
    for value in frame {
        out.extend_from_slice(&value.to_ne_bytes());
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    bytes: Vec<u8>,
    frames: usize,
    finished: usize,
}

/// 内存输出
///
/// 克隆共享同一缓冲区，可在 sink 被消耗后继续检查内容和释放次数。
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
    fail_after_frames: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入 `frames` 个帧后，后续写入返回错误
    pub fn failing_after(frames: usize) -> Self {
        Self {
            fail_after_frames: Some(frames),
            ..Self::default()
        }
    }

    /// 已写入的原始字节
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().bytes.clone()
    }

    pub fn frames(&self) -> usize {
        self.state.lock().frames
    }

    /// `finish` 被调用的次数
    pub fn finish_count(&self) -> usize {
        self.state.lock().finished
    }

    /// 按本机字节序解码为采样值
    pub fn samples(&self) -> Vec<f32> {
        decode_samples(&self.state.lock().bytes)
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &[f32]) -> io::Result<()> {
        let mut state = self.state.lock();
        if self.fail_after_frames.is_some_and(|limit| state.frames >= limit) {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "memory sink full"));
        }
        let mut encoded = Vec::new();
        encode_frame(frame, &mut encoded);
        state.bytes.extend_from_slice(&encoded);
        state.frames += 1;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.state.lock().bytes.len() as u64
    }

    fn finish(self) -> io::Result<u64> {
        let mut state = self.state.lock();
        state.finished += 1;
        Ok(state.bytes.len() as u64)
    }
}

fn decode_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(SAMPLE_SIZE_BYTES)
        .map(|chunk| {
            let mut raw = [0u8; SAMPLE_SIZE_BYTES];
            raw.copy_from_slice(chunk);
            f32::from_ne_bytes(raw)
        })
        .collect()
}

/// 读取原始数据文件
///
/// 文件长度必须是整数个帧，否则返回 `InvalidData`。
pub fn read_raw_samples(
    path: impl AsRef<Path>,
    channel_count: usize,
) -> io::Result<AcquisitionBatch> {
    let mut bytes = Vec::new();
    File::open(path.as_ref())?.read_to_end(&mut bytes)?;

    let frame_len = channel_count.checked_mul(SAMPLE_SIZE_BYTES).unwrap_or(0);
    if frame_len == 0 || bytes.len() % frame_len != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{} bytes is not a whole number of {}-channel frames",
                bytes.len(),
                channel_count
            ),
        ));
    }

    AcquisitionBatch::new(channel_count, decode_samples(&bytes))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
