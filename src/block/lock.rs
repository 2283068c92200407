//! 设备并发锁策略
//!
//! 每个卷公开操作在执行期间持有锁守卫，守卫析构时释放。
//! 三种策略：
//! - `NoLock` - 单线程环境，无锁（默认）
//! - `GlobalLock` - 所有设备共用一把锁
//! - `PerDeviceLock` - 每个设备单元一把锁
//!
//! # 示例
//!
//! ```rust,ignore
//! // 单线程
//! let vol = Volume::mount(dev, VolumeConfig::default(), Arc::new(NoLock), 0)?;
//!
//! // 两个卷共用一把锁
//! let lock = Arc::new(GlobalLock::new());
//! let a = Volume::mount(dev_a, cfg, lock.clone(), 0)?;
//! let b = Volume::mount(dev_b, cfg, lock, 1)?;
//! ```

use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

/// 设备锁 trait
pub trait DeviceLock {
    /// 锁守卫，析构时释放
    type Guard<'a>
    where
        Self: 'a;

    /// 获取 `unit` 对应的锁
    fn lock(&self, unit: usize) -> Self::Guard<'_>;
}

/// 无锁实现
pub struct NoLock;

impl DeviceLock for NoLock {
    type Guard<'a> = ();

    #[inline]
    fn lock(&self, _unit: usize) -> Self::Guard<'_> {}
}

/// 全局锁：所有单元串行
pub struct GlobalLock {
    inner: Mutex<()>,
}

impl GlobalLock {
    /// 创建未持有的锁
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(()),
        }
    }

    /// 锁当前是否被持有
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl Default for GlobalLock {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLock for GlobalLock {
    type Guard<'a> = MutexGuard<'a, ()>;

    fn lock(&self, _unit: usize) -> Self::Guard<'_> {
        self.inner.lock()
    }
}

/// 每设备锁：不同单元互不阻塞
pub struct PerDeviceLock {
    units: Vec<Mutex<()>>,
}

impl PerDeviceLock {
    /// 创建 `num_units` 把锁（至少一把）
    pub fn new(num_units: usize) -> Self {
        let mut units = Vec::with_capacity(num_units.max(1));
        units.resize_with(num_units.max(1), || Mutex::new(()));
        Self { units }
    }

    /// 单元 `unit` 的锁当前是否被持有
    pub fn is_locked(&self, unit: usize) -> bool {
        self.units[unit % self.units.len()].is_locked()
    }
}

impl DeviceLock for PerDeviceLock {
    type Guard<'a> = MutexGuard<'a, ()>;

    fn lock(&self, unit: usize) -> Self::Guard<'_> {
        // 超出范围的单元号回绕
        self.units[unit % self.units.len()].lock()
    }
}
