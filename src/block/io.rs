//! 扇区 I/O 操作实现
//!
//! 读路径：日志副本 → 扇区缓存 → 设备（并填充缓存）。
//! 写路径：参与日志的写在事务打开期间交给日志；其余先交给缓存，
//! 缓存未吸收时写设备。连续扇区写（burst）绕过缓存，但会先丢弃
//! 范围内的缓存副本。

use super::{BlockDevice, DeviceIoctl, LogicalDev};
use crate::{cache::SectorType, error::Result};
use alloc::vec;

impl<D: BlockDevice> LogicalDev<D> {
    /// 读取单个扇区
    ///
    /// # 参数
    ///
    /// * `sector` - 扇区号
    /// * `buf` - 目标缓冲区（大小至少为 sector_size）
    /// * `stype` - 扇区类型，决定缓存策略
    pub fn read_sector(&mut self, sector: u32, buf: &mut [u8], stype: SectorType) -> Result<()> {
        let ss = self.check_buf(buf.len(), 1)?;
        self.inc_read_count();

        if self.guard.has_journal() {
            if let Some(journal) = self.guard.journal_mut() {
                if journal.read_sector(sector, &mut buf[..ss]) {
                    return Ok(());
                }
            }
        }

        if let Some(cache) = &mut self.cache {
            if cache.read_from_cache(&self.device, sector, &mut buf[..ss]) {
                return Ok(());
            }
        }

        self.inc_physical_read_count();
        self.device.read_sectors(sector, &mut buf[..ss], 1)?;

        if let Some(cache) = &mut self.cache {
            cache.update_cache(&mut self.device, sector, &buf[..ss], stype)?;
        }
        Ok(())
    }

    /// 读取单个扇区，不改变缓存状态
    ///
    /// 缓存中有副本时直接复制（不更新访问计数），否则读设备且不填充缓存。
    /// 用于必须在失败时保持缓存原样的检查遍历。
    pub fn read_sector_untracked(&mut self, sector: u32, buf: &mut [u8]) -> Result<()> {
        let ss = self.check_buf(buf.len(), 1)?;
        self.inc_read_count();

        if let Some(cache) = &self.cache {
            if cache.peek(sector, &mut buf[..ss]) {
                return Ok(());
            }
        }
        self.inc_physical_read_count();
        self.device.read_sectors(sector, &mut buf[..ss], 1)
    }

    /// 连续读取多个扇区
    ///
    /// 一次设备读，之后用缓存中的副本（可能是脏的）覆盖对应扇区。
    pub fn read_sectors_burst(&mut self, first: u32, buf: &mut [u8], count: u32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let ss = self.check_buf(buf.len(), count)?;
        self.inc_read_count();
        self.inc_physical_read_count();
        self.device.read_sectors(first, &mut buf[..ss * count as usize], count)?;

        if let Some(cache) = &self.cache {
            for i in 0..count as usize {
                cache.peek(first + i as u32, &mut buf[i * ss..(i + 1) * ss]);
            }
        }
        Ok(())
    }

    /// 写入单个扇区
    ///
    /// # 参数
    ///
    /// * `sector` - 扇区号
    /// * `buf` - 源数据（大小至少为 sector_size）
    /// * `stype` - 扇区类型
    /// * `journal` - 本次写是否参与日志
    pub fn write_sector(
        &mut self,
        sector: u32,
        buf: &[u8],
        stype: SectorType,
        journal: bool,
    ) -> Result<()> {
        let ss = self.check_buf(buf.len(), 1)?;
        self.inc_write_count();

        if journal && self.guard.is_journaling() {
            // 日志持有新内容，缓存副本作废
            if let Some(cache) = &mut self.cache {
                cache.free_sectors(sector, 1);
            }
            if let Some(j) = self.guard.journal_mut() {
                if j.write_sectors(&mut self.device, sector, &buf[..ss], 1)? {
                    return Ok(());
                }
            }
            self.inc_physical_write_count();
            return self.device.write_sectors(sector, &buf[..ss], 1, false);
        }

        let absorbed = match &mut self.cache {
            Some(cache) => cache.write_into_cache(&mut self.device, sector, &buf[..ss], stype)?,
            None => false,
        };
        if absorbed {
            return Ok(());
        }

        self.inc_physical_write_count();
        if let Err(e) = self.device.write_sectors(sector, &buf[..ss], 1, false) {
            log::error!("[CACHE] write of sector {} failed: {}", sector, e);
            // 缓存副本可能已经是新内容，而设备上不是
            if let Some(cache) = &mut self.cache {
                cache.free_sectors(sector, 1);
            }
            return Err(e);
        }
        Ok(())
    }

    /// 连续写入多个扇区（一次设备调用）
    pub fn write_sectors_burst(
        &mut self,
        first: u32,
        buf: &[u8],
        count: u32,
        journal: bool,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let ss = self.check_buf(buf.len(), count)?;
        let data = &buf[..ss * count as usize];
        self.inc_write_count();

        if let Some(cache) = &mut self.cache {
            cache.free_sectors(first, count);
        }

        if journal && self.guard.is_journaling() {
            if let Some(j) = self.guard.journal_mut() {
                if j.write_sectors(&mut self.device, first, data, count)? {
                    return Ok(());
                }
            }
        }

        self.inc_physical_write_count();
        self.device.write_sectors(first, data, count, false)
    }

    /// 把 `count` 个扇区写为全零
    pub fn zero_sectors(&mut self, first: u32, count: u32, journal: bool) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let ss = self.sector_size() as usize;
        self.inc_write_count();

        if let Some(cache) = &mut self.cache {
            cache.free_sectors(first, count);
        }

        if journal && self.guard.is_journaling() {
            let zeros = vec![0u8; ss * count as usize];
            if let Some(j) = self.guard.journal_mut() {
                if j.write_sectors(&mut self.device, first, &zeros, count)? {
                    return Ok(());
                }
            }
        }

        let zero = vec![0u8; ss];
        self.inc_physical_write_count();
        self.device.write_sectors(first, &zero, count, true)
    }

    /// 通知扇区范围不再使用
    ///
    /// 缓存副本（包括脏数据）被丢弃，然后把提示转发给设备驱动。
    pub fn free_sectors(&mut self, first: u32, count: u32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if let Some(cache) = &mut self.cache {
            cache.free_sectors(first, count);
        }
        self.device.ioctl(DeviceIoctl::FreeSectors { first, count })?;
        Ok(())
    }

    /// 刷新
    ///
    /// 两层：先回写缓存中的脏扇区，再让驱动同步。
    pub fn flush(&mut self) -> Result<()> {
        if let Some(cache) = &mut self.cache {
            cache.clean(&mut self.device)?;
        }
        self.device.ioctl(DeviceIoctl::Sync)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{CacheCommand, CacheMode, SectorTypeMask},
        testing::{JournalLog, RamDisk, RecordingJournal},
    };
    use alloc::boxed::Box;

    fn cached_dev() -> LogicalDev<RamDisk> {
        // 4 组 × 2 路
        LogicalDev::with_cache(RamDisk::new(512, 64), 20 + 8 * 520)
    }

    #[test]
    fn test_read_without_cache() {
        let mut disk = RamDisk::new(512, 16);
        disk.fill_sector(3, 0xAB);
        let mut dev = LogicalDev::new(disk);

        let mut buf = vec![0u8; 512];
        dev.read_sector(3, &mut buf, SectorType::Data).unwrap();
        assert!(buf.iter().all(|&b| b == 0xAB));
        assert_eq!(dev.physical_read_count(), 1);
    }

    #[test]
    fn test_buffer_too_small() {
        let mut dev = LogicalDev::new(RamDisk::new(512, 16));
        let mut buf = vec![0u8; 100];
        assert!(dev.read_sector(0, &mut buf, SectorType::Data).is_err());
    }

    #[test]
    fn test_second_read_hits_cache() {
        let mut disk = RamDisk::new(512, 64);
        disk.fill_sector(5, 0x11);
        let mut dev = LogicalDev::with_cache(disk, 20 + 8 * 520);

        let mut buf = vec![0u8; 512];
        dev.read_sector(5, &mut buf, SectorType::Directory).unwrap();
        dev.read_sector(5, &mut buf, SectorType::Directory).unwrap();
        assert_eq!(dev.read_count(), 2);
        assert_eq!(dev.physical_read_count(), 1);
        assert_eq!(dev.device().reads, 1);
    }

    #[test]
    fn test_write_through_updates_cached_copy() {
        let mut dev = cached_dev();
        let mut buf = vec![0u8; 512];
        dev.read_sector(7, &mut buf, SectorType::Data).unwrap();

        let new = vec![0x5Au8; 512];
        dev.write_sector(7, &new, SectorType::Data, false).unwrap();
        assert_eq!(dev.device().sector(7), &new[..]);

        dev.read_sector(7, &mut buf, SectorType::Data).unwrap();
        assert_eq!(buf, new);
        assert_eq!(dev.device().reads, 1);
    }

    #[test]
    fn test_write_back_defers_device_write_until_flush() {
        let mut dev = cached_dev();
        dev.cache_command(CacheCommand::SetMode {
            types: SectorTypeMask::DATA,
            mode: CacheMode::WRITE_BACK,
        })
        .unwrap();

        let new = vec![0x77u8; 512];
        dev.write_sector(9, &new, SectorType::Data, false).unwrap();
        assert_eq!(dev.device().writes, 0);

        dev.flush().unwrap();
        assert_eq!(dev.device().writes, 1);
        assert_eq!(dev.device().sector(9), &new[..]);
    }

    #[test]
    fn test_failed_device_write_drops_cached_copy() {
        let mut dev = cached_dev();
        let mut buf = vec![0u8; 512];
        dev.read_sector(4, &mut buf, SectorType::Data).unwrap();

        dev.device_mut().fail_write_sector = Some(4);
        let err = dev.write_sector(4, &[0xEEu8; 512], SectorType::Data, false);
        assert!(err.is_err());

        dev.device_mut().fail_write_sector = None;
        dev.read_sector(4, &mut buf, SectorType::Data).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(dev.device().reads, 2);
    }

    #[test]
    fn test_burst_write_discards_cached_copies() {
        let mut dev = cached_dev();
        let mut buf = vec![0u8; 512];
        dev.read_sector(10, &mut buf, SectorType::Data).unwrap();

        let data = vec![0x42u8; 512 * 3];
        dev.write_sectors_burst(10, &data, 3, false).unwrap();
        assert_eq!(dev.device().write_log, vec![(10, 3, false)]);

        dev.read_sector(10, &mut buf, SectorType::Data).unwrap();
        assert!(buf.iter().all(|&b| b == 0x42));
    }

    #[test]
    fn test_burst_read_sees_dirty_cache() {
        let mut dev = cached_dev();
        dev.cache_command(CacheCommand::SetMode {
            types: SectorTypeMask::DATA,
            mode: CacheMode::WRITE_BACK,
        })
        .unwrap();
        dev.write_sector(21, &[0x99u8; 512], SectorType::Data, false).unwrap();

        let mut buf = vec![0u8; 512 * 2];
        dev.read_sectors_burst(20, &mut buf, 2).unwrap();
        assert!(buf[..512].iter().all(|&b| b == 0));
        assert!(buf[512..].iter().all(|&b| b == 0x99));
    }

    #[test]
    fn test_zero_sectors_uses_repeat() {
        let mut disk = RamDisk::new(512, 16);
        disk.fill_sector(2, 0xFF);
        disk.fill_sector(3, 0xFF);
        let mut dev = LogicalDev::new(disk);

        dev.zero_sectors(2, 2, false).unwrap();
        assert_eq!(dev.device().write_log, vec![(2, 2, true)]);
        assert!(dev.device().sector(3).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_free_sectors_forwards_hint() {
        let mut dev = cached_dev();
        dev.free_sectors(12, 4).unwrap();
        assert_eq!(dev.device().freed, vec![(12, 4)]);
    }

    #[test]
    fn test_untracked_read_leaves_cache_alone() {
        let mut dev = cached_dev();
        let mut buf = vec![0u8; 512];
        dev.read_sector_untracked(6, &mut buf).unwrap();
        dev.read_sector_untracked(6, &mut buf).unwrap();
        assert_eq!(dev.device().reads, 2);
        assert_eq!(dev.cache().map(|c| c.stats().misses), Some(0));
    }

    #[test]
    fn test_journaled_write_goes_through_journal() {
        let log = JournalLog::default();
        let mut dev = cached_dev();
        dev.set_journal(Box::new(RecordingJournal::new(log.clone()))).unwrap();

        dev.begin_transaction().unwrap();
        dev.write_sector(1, &[0x33u8; 512], SectorType::Management, true).unwrap();
        dev.write_sector(40, &[0x44u8; 512], SectorType::Data, false).unwrap();
        dev.end_transaction(Ok(())).unwrap();

        assert_eq!(log.writes(), vec![(1, 1)]);
        // 日志未接管，数据仍落到设备
        assert!(dev.device().sector(1).iter().all(|&b| b == 0x33));
        assert!(dev.device().sector(40).iter().all(|&b| b == 0x44));
    }
}
