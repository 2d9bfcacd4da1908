//! 命令序列器
//!
//! 参数设置请求先压入 [`PendingBatch`]，直到某条请求带有 apply 标记时，
//! 才把整批请求按压栈顺序下发给设备。设备硬件状态只在下发时改变。

use crate::error::SessionError;
use edl_device::DeviceSession;
use edl_protocol::CommandRequest;
use smallvec::SmallVec;
use tracing::{debug, trace};

/// 自上次下发以来累积的请求
///
/// 单次配置通常不超过 8 条命令，内联存储避免堆分配。
pub type PendingBatch = SmallVec<[CommandRequest; 8]>;

/// 命令序列器
#[derive(Debug, Default)]
pub struct CommandSequencer {
    pending: PendingBatch,
}

impl CommandSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 压栈，不接触设备
    pub fn stack(&mut self, request: CommandRequest) {
        trace!("Stacked {:?}", request);
        self.pending.push(request);
    }

    /// 压栈并下发整批请求
    ///
    /// 按压栈顺序逐条交给设备，除最后一条外 `apply = false`，最后一条
    /// `apply = true`，因此 apply 请求永远在其之前的所有请求之后到达。
    /// 返回下发的请求数。
    ///
    /// 中途失败时，未送达的剩余请求被丢弃，批次清空，错误向上传播。
    pub fn stack_and_apply<D>(
        &mut self,
        device: &mut D,
        request: CommandRequest,
    ) -> Result<usize, SessionError>
    where
        D: DeviceSession + ?Sized,
    {
        self.stack(request);
        self.flush(device)
    }

    /// 依次压栈 `requests`，最后一条带 apply 标记
    pub fn submit<D>(
        &mut self,
        device: &mut D,
        requests: &[CommandRequest],
    ) -> Result<usize, SessionError>
    where
        D: DeviceSession + ?Sized,
    {
        let Some((last, head)) = requests.split_last() else {
            return Ok(0);
        };
        for request in head {
            self.stack(*request);
        }
        self.stack_and_apply(device, *last)
    }

    fn flush<D>(&mut self, device: &mut D) -> Result<usize, SessionError>
    where
        D: DeviceSession + ?Sized,
    {
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();

        for (index, request) in batch.into_iter().enumerate() {
            let apply = index + 1 == count;
            let (id, payload) = request.into_parts();
            device
                .set_command(id, payload, apply)
                .map_err(SessionError::Command)?;
        }

        debug!("Flushed {} stacked commands", count);
        Ok(count)
    }

    /// 尚未下发的请求
    pub fn pending(&self) -> &[CommandRequest] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 丢弃尚未下发的请求
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
