//! 逻辑块设备核心类型

use crate::{
    cache::{CacheCommand, SectorCache},
    error::{Error, ErrorKind, Result},
    transaction::{Journal, TransactionGuard},
};
use alloc::boxed::Box;

/// 逻辑块设备接口
///
/// 实现此 trait 以提供底层扇区访问（NAND/NOR 驱动及其磨损均衡层）。
/// 扇区大小由设备报告且固定；读写可能瞬时失败，本层不重试。
///
/// # 示例
///
/// ```rust,ignore
/// use flashfat_core::{BlockDevice, Result};
///
/// struct MyFlash {
///     // ...
/// }
///
/// impl BlockDevice for MyFlash {
///     fn sector_size(&self) -> u32 {
///         512
///     }
///
///     fn num_sectors(&self) -> u32 {
///         65536
///     }
///
///     fn read_sectors(&mut self, sector: u32, buf: &mut [u8], count: u32) -> Result<()> {
///         // 读取 count 个扇区
///         Ok(())
///     }
///
///     fn write_sectors(&mut self, sector: u32, buf: &[u8], count: u32, repeat_same: bool) -> Result<()> {
///         // repeat_same 为 true 时 buf 只有一个扇区，重复写 count 次
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice {
    /// 扇区大小（字节）
    fn sector_size(&self) -> u32;

    /// 扇区总数
    fn num_sectors(&self) -> u32;

    /// 读取扇区
    ///
    /// # 参数
    ///
    /// * `sector` - 起始扇区号
    /// * `buf` - 目标缓冲区（大小至少为 count * sector_size）
    /// * `count` - 扇区数
    fn read_sectors(&mut self, sector: u32, buf: &mut [u8], count: u32) -> Result<()>;

    /// 写入扇区
    ///
    /// # 参数
    ///
    /// * `sector` - 起始扇区号
    /// * `buf` - 源缓冲区
    /// * `count` - 扇区数
    /// * `repeat_same` - 为 true 时 `buf` 只包含一个扇区，同一内容写 `count` 次
    fn write_sectors(&mut self, sector: u32, buf: &[u8], count: u32, repeat_same: bool) -> Result<()>;

    /// 设备控制命令
    ///
    /// 默认实现忽略所有命令。
    fn ioctl(&mut self, cmd: DeviceIoctl) -> Result<u32> {
        let _ = cmd;
        Ok(0)
    }
}

/// 转发给设备驱动的控制命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIoctl {
    /// 扇区范围已不再使用（闪存层可以回收）
    FreeSectors {
        /// 起始扇区
        first: u32,
        /// 扇区数
        count: u32,
    },
    /// 把驱动内部缓冲写到介质
    Sync,
    /// 卷即将卸载
    Unmount,
}

/// 逻辑设备
///
/// 包装外部块设备，持有该设备的扇区缓存和事务守卫，并统计读写次数。
/// 每个设备一个实例，不存在全局表：缓存和日志随设备对象一起传递。
///
/// 对应关系：
///
/// | 组件             | 所有者        |
/// |------------------|---------------|
/// | 扇区缓存         | `LogicalDev`  |
/// | 事务守卫 / 日志  | `LogicalDev`  |
/// | 锁策略           | `Volume`      |
pub struct LogicalDev<D> {
    /// 底层设备
    pub(super) device: D,
    /// 扇区缓存（可选）
    pub(super) cache: Option<SectorCache>,
    /// 事务守卫
    pub(super) guard: TransactionGuard,
    /// 逻辑读取次数（包括缓存命中）
    read_count: u64,
    /// 逻辑写入次数（包括被缓存吸收的写）
    write_count: u64,
    /// 物理读取次数（实际设备操作）
    physical_read_count: u64,
    /// 物理写入次数（实际设备操作）
    physical_write_count: u64,
}

impl<D: BlockDevice> LogicalDev<D> {
    /// 创建逻辑设备（无缓存）
    pub fn new(device: D) -> Self {
        Self {
            device,
            cache: None,
            guard: TransactionGuard::new(),
            read_count: 0,
            write_count: 0,
            physical_read_count: 0,
            physical_write_count: 0,
        }
    }

    /// 创建带扇区缓存的逻辑设备
    ///
    /// # 参数
    ///
    /// * `device` - 底层块设备
    /// * `region_bytes` - 缓存内存预算（字节）
    pub fn with_cache(device: D, region_bytes: usize) -> Self {
        let mut dev = Self::new(device);
        dev.attach_cache(region_bytes);
        dev
    }

    /// 挂接扇区缓存
    ///
    /// 替换已有缓存前不会回写，调用者应先 [`flush`](Self::flush)。
    ///
    /// # 返回
    ///
    /// 缓存能容纳的扇区数；区域小于管理结构时返回 0，缓存被禁用
    pub fn attach_cache(&mut self, region_bytes: usize) -> u32 {
        match SectorCache::new(region_bytes) {
            Some(mut cache) => {
                let managed = cache.configure(&self.device);
                log::debug!(
                    "[CACHE] attached: {} bytes, {} sectors managed",
                    region_bytes,
                    managed
                );
                self.cache = Some(cache);
                managed
            }
            None => {
                log::warn!("[CACHE] region of {} bytes too small, cache disabled", region_bytes);
                self.cache = None;
                0
            }
        }
    }

    /// 回写并移除扇区缓存
    pub fn detach_cache(&mut self) -> Result<()> {
        if let Some(cache) = &mut self.cache {
            cache.clean(&mut self.device)?;
        }
        self.cache = None;
        Ok(())
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取底层设备的可变引用
    ///
    /// 直接操作设备会绕过缓存，调用者负责一致性。
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 取回底层设备
    pub fn into_inner(self) -> D {
        self.device
    }

    /// 扇区大小
    pub fn sector_size(&self) -> u32 {
        self.device.sector_size()
    }

    /// 扇区总数
    pub fn num_sectors(&self) -> u32 {
        self.device.num_sectors()
    }

    /// 获取扇区缓存
    pub fn cache(&self) -> Option<&SectorCache> {
        self.cache.as_ref()
    }

    /// 检查是否启用了缓存
    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// 执行缓存命令
    ///
    /// 没有缓存时所有命令返回 0。
    pub fn cache_command(&mut self, cmd: CacheCommand) -> Result<u32> {
        match &mut self.cache {
            Some(cache) => cache.command(&mut self.device, cmd),
            None => Ok(0),
        }
    }

    /// 使整个缓存失效（不回写）
    pub fn invalidate_cache(&mut self) {
        if let Some(cache) = &mut self.cache {
            cache.invalidate_all();
        }
    }

    // ===== 事务 =====

    /// 挂接日志
    pub fn set_journal(&mut self, journal: Box<dyn Journal>) -> Result<()> {
        self.guard.set_journal(journal)
    }

    /// 获取事务守卫
    pub fn transaction(&self) -> &TransactionGuard {
        &self.guard
    }

    /// 开始事务
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.guard.begin()
    }

    /// 结束事务，并把操作结果报告给日志
    ///
    /// 操作失败时返回操作的错误；操作成功但提交失败时返回提交错误。
    pub fn end_transaction<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.guard.mark_error(e);
        }
        let end = self.guard.end(&mut self.device);
        match (result, end) {
            (Ok(v), Ok(())) => Ok(v),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    // ===== 统计 =====

    /// 获取逻辑读取次数（包括缓存命中）
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// 获取逻辑写入次数
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// 获取物理读取次数（实际设备操作）
    pub fn physical_read_count(&self) -> u64 {
        self.physical_read_count
    }

    /// 获取物理写入次数（实际设备操作）
    pub fn physical_write_count(&self) -> u64 {
        self.physical_write_count
    }

    pub(super) fn inc_read_count(&mut self) {
        self.read_count += 1;
    }

    pub(super) fn inc_write_count(&mut self) {
        self.write_count += 1;
    }

    pub(super) fn inc_physical_read_count(&mut self) {
        self.physical_read_count += 1;
    }

    pub(super) fn inc_physical_write_count(&mut self) {
        self.physical_write_count += 1;
    }

    /// 检查缓冲区能容纳 `count` 个扇区
    pub(super) fn check_buf(&self, len: usize, count: u32) -> Result<usize> {
        let ss = self.device.sector_size() as usize;
        if len < ss * count as usize {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Buffer too small for requested sectors",
            ));
        }
        Ok(ss)
    }
}
