//! 时钟与等待策略
//!
//! 所有退避等待、补偿驻留和采集截止时间都经由 [`Clock`] 计算，
//! 测试中用 [`ManualClock`] 替换即可让等待瞬间完成。

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 可注入的时钟
pub trait Clock {
    /// 当前单调时间
    fn now(&self) -> Instant;

    /// 阻塞等待（不可取消）
    fn sleep(&self, duration: Duration);

    /// 自 `since` 起经过的时间
    fn elapsed(&self, since: Instant) -> Duration {
        self.now().saturating_duration_since(since)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// 系统时钟（高精度睡眠）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        // 1ms 级别的退避需要比 thread::sleep 更精确
        spin_sleep::sleep(duration);
    }
}

#[derive(Debug)]
struct ManualState {
    now: Instant,
    sleeps: Vec<Duration>,
}

/// 虚拟时钟
///
/// `sleep` 立即返回并把虚拟时间向前推进，同时记录每次等待的时长。
/// 克隆共享同一时间线。
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: Instant::now(),
                sleeps: Vec::new(),
            })),
        }
    }

    /// 手动推进虚拟时间（不计入等待记录）
    pub fn advance(&self, duration: Duration) {
        self.state.lock().now += duration;
    }

    /// 全部等待记录
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    pub fn sleep_count(&self) -> usize {
        self.state.lock().sleeps.len()
    }

    /// 累计等待时长
    pub fn total_slept(&self) -> Duration {
        self.state.lock().sleeps.iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().now
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.now += duration;
        state.sleeps.push(duration);
    }
}
