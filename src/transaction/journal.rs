//! 日志（故障安全事务）接口
//!
//! 日志本身是外部组件，存储核心只使用 begin / mark_error / end 协议，
//! 外加两个可选钩子：事务打开期间接管参与日志的扇区写入，以及为
//! 日志中尚未提交的扇区提供读取。

use crate::{block::BlockDevice, error::{Error, Result}};

/// 日志接口
///
/// 实现者保证同一时刻最多一个事务在进行中；嵌套由
/// [`TransactionGuard`](super::TransactionGuard) 处理，日志只看到最外层的
/// begin/end。
pub trait Journal {
    /// 打开事务
    fn begin(&mut self) -> Result<()>;

    /// 报告事务中某个操作失败
    ///
    /// 在 `end` 之前调用，日志据此决定丢弃还是提交。
    fn mark_error(&mut self, err: &Error);

    /// 结束事务（提交或回滚）
    fn end(&mut self, dev: &mut dyn BlockDevice) -> Result<()>;

    /// 接管一次参与日志的扇区写入
    ///
    /// 返回 `true` 表示日志已保存数据，调用者不再写设备。
    fn write_sectors(
        &mut self,
        dev: &mut dyn BlockDevice,
        sector: u32,
        buf: &[u8],
        count: u32,
    ) -> Result<bool> {
        let _ = (dev, sector, buf, count);
        Ok(false)
    }

    /// 读取日志中保存的扇区副本
    ///
    /// 返回 `true` 表示 `buf` 已填充。
    fn read_sector(&mut self, sector: u32, buf: &mut [u8]) -> bool {
        let _ = (sector, buf);
        false
    }
}
