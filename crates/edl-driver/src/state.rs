//! 会话状态定义
//!
//! ```text
//! Disconnected → Connecting → Connected → Configuring → Compensating
//!     → Armed → Streaming → Disconnecting → Disconnected
//! ```
//!
//! 任意状态遇到致命设备错误都会进入 `Faulted`，之后只允许断开。

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Configuring,
    Compensating,
    Armed,
    Streaming,
    Disconnecting,
    Faulted,
}

impl SessionState {
    /// 是否允许从 `self` 转换到 `next`
    ///
    /// 配置阶段之间允许互相回退（例如采集结束后重新配置或再次补偿），
    /// `Faulted` 只能进入 `Disconnecting`。
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if next == Faulted {
            return true;
        }
        match self {
            Disconnected => next == Connecting,
            Connecting => matches!(next, Connected | Disconnected),
            Connected | Configuring | Compensating => {
                matches!(next, Configuring | Compensating | Armed | Disconnecting)
            },
            Armed => matches!(
                next,
                Configuring | Compensating | Armed | Streaming | Disconnecting
            ),
            Streaming => matches!(next, Armed | Disconnecting),
            Disconnecting => matches!(next, Disconnected | Disconnecting),
            Faulted => next == Disconnecting,
        }
    }
}
