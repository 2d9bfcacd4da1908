//! 采集观察者
//!
//! 在采集循环的关键事件上触发用户回调，例如把缓冲区溢出、丢数事件
//! 转发给界面或统计模块。回调不会改变采集循环的行为。
//!
//! # 使用示例
//!
//! ```rust
//! use edl_driver::observer::{AcquisitionObserver, ObserverSet};
//! use edl_protocol::DeviceStatus;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct OverflowCounter(AtomicUsize);
//!
//! impl AcquisitionObserver for OverflowCounter {
//!     fn on_buffer_overflow(&self, _status: &DeviceStatus) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//!
//! let counter = Arc::new(OverflowCounter::default());
//! let mut observers = ObserverSet::new();
//! observers.add_observer(counter.clone());
//! observers.buffer_overflow(&DeviceStatus::new(20).with_buffer_overflow(true));
//! assert_eq!(counter.0.load(Ordering::Relaxed), 1);
//! ```

use edl_protocol::{AcquisitionBatch, DeviceStatus};
use std::sync::Arc;

/// 采集事件回调
///
/// 所有方法默认为空操作，只需实现关心的事件。回调在采集线程上同步执行，
/// 应尽快返回。
pub trait AcquisitionObserver: Send + Sync {
    /// 设备报告缓冲区溢出
    fn on_buffer_overflow(&self, status: &DeviceStatus) {
        let _ = status;
    }

    /// 设备报告数据丢失
    fn on_data_lost(&self, status: &DeviceStatus) {
        let _ = status;
    }

    /// 读取返回的帧数少于请求数
    fn on_partial_read(&self, requested: u32, actual: usize) {
        let _ = (requested, actual);
    }

    /// 一批数据已全部写入输出
    fn on_batch_persisted(&self, batch: &AcquisitionBatch) {
        let _ = batch;
    }
}

/// 观察者集合
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn AcquisitionObserver>>,
}

impl ObserverSet {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn AcquisitionObserver>) {
        self.observers.push(observer);
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn buffer_overflow(&self, status: &DeviceStatus) {
        for observer in &self.observers {
            observer.on_buffer_overflow(status);
        }
    }

    pub fn data_lost(&self, status: &DeviceStatus) {
        for observer in &self.observers {
            observer.on_data_lost(status);
        }
    }

    pub fn partial_read(&self, requested: u32, actual: usize) {
        for observer in &self.observers {
            observer.on_partial_read(requested, actual);
        }
    }

    pub fn batch_persisted(&self, batch: &AcquisitionBatch) {
        for observer in &self.observers {
            observer.on_batch_persisted(batch);
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        lost: AtomicUsize,
        partial: AtomicUsize,
        frames: AtomicUsize,
    }

    impl AcquisitionObserver for Counter {
        fn on_data_lost(&self, _status: &DeviceStatus) {
            self.lost.fetch_add(1, Ordering::Relaxed);
        }

        fn on_partial_read(&self, _requested: u32, actual: usize) {
            self.partial.fetch_add(actual, Ordering::Relaxed);
        }

        fn on_batch_persisted(&self, batch: &AcquisitionBatch) {
            self.frames.fetch_add(batch.frame_count(), Ordering::Relaxed);
        }
    }

    #[test]
    fn test_observer_set_dispatch() {
        let counter = Arc::new(Counter::default());
        let mut set = ObserverSet::new();
        assert!(set.is_empty());

        set.add_observer(counter.clone());
        set.add_observer(counter.clone());
        assert_eq!(set.len(), 2);

        set.data_lost(&DeviceStatus::default());
        set.partial_read(10, 3);
        set.batch_persisted(&AcquisitionBatch::new(2, vec![0.0; 4]).unwrap());
        // 未实现的回调使用默认空操作
        set.buffer_overflow(&DeviceStatus::default());

        assert_eq!(counter.lost.load(Ordering::Relaxed), 2);
        assert_eq!(counter.partial.load(Ordering::Relaxed), 6);
        assert_eq!(counter.frames.load(Ordering::Relaxed), 4);

        set.clear();
        assert!(set.is_empty());
    }
}
