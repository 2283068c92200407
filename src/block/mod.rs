//! 块设备抽象
//!
//! 提供逻辑块设备接口和扇区级 I/O 操作。
//! block/device.rs 定义外部设备接口和 `LogicalDev`（持有缓存与事务守卫）。
//! block/io.rs 提供经过日志和缓存的扇区读写、burst 读写、清零和释放。
//! block/lock.rs 提供卷操作使用的锁策略。

mod device;
mod io;
mod lock;

pub use device::{BlockDevice, DeviceIoctl, LogicalDev};
pub use lock::{DeviceLock, GlobalLock, NoLock, PerDeviceLock};
