//! 测试辅助：内存块设备、卷镜像构建、记录型日志、固定时间源

use crate::{
    block::{BlockDevice, DeviceIoctl},
    crypt::SectorCipher,
    consts::*,
    error::{Error, Result},
    fs::TimeProvider,
    transaction::Journal,
};
use alloc::{rc::Rc, vec, vec::Vec};
use byteorder::{ByteOrder, LittleEndian};
use core::{cell::RefCell, time::Duration};

/// 内存块设备
///
/// 记录每次读写调用，可注入写失败。
#[derive(Debug)]
pub(crate) struct RamDisk {
    pub sector_size: u32,
    pub data: Vec<u8>,
    /// 读调用次数
    pub reads: u32,
    /// 写调用次数
    pub writes: u32,
    /// 写调用记录 (起始扇区, 扇区数, repeat_same)
    pub write_log: Vec<(u32, u32, bool)>,
    /// 释放提示记录
    pub freed: Vec<(u32, u32)>,
    /// 写入该扇区时失败
    pub fail_write_sector: Option<u32>,
    /// 所有写入失败
    pub fail_all_writes: bool,
}

impl RamDisk {
    pub fn new(sector_size: u32, num_sectors: u32) -> Self {
        Self {
            sector_size,
            data: vec![0u8; (sector_size * num_sectors) as usize],
            reads: 0,
            writes: 0,
            write_log: Vec::new(),
            freed: Vec::new(),
            fail_write_sector: None,
            fail_all_writes: false,
        }
    }

    pub fn sector(&self, sector: u32) -> &[u8] {
        let ss = self.sector_size as usize;
        let start = sector as usize * ss;
        &self.data[start..start + ss]
    }

    pub fn fill_sector(&mut self, sector: u32, value: u8) {
        let ss = self.sector_size as usize;
        let start = sector as usize * ss;
        self.data[start..start + ss].fill(value);
    }
}

impl BlockDevice for RamDisk {
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn num_sectors(&self) -> u32 {
        (self.data.len() / self.sector_size as usize) as u32
    }

    fn read_sectors(&mut self, sector: u32, buf: &mut [u8], count: u32) -> Result<()> {
        self.reads += 1;
        let ss = self.sector_size as usize;
        let start = sector as usize * ss;
        let len = count as usize * ss;
        if start + len > self.data.len() {
            return Err(Error::io("read past end of disk"));
        }
        buf[..len].copy_from_slice(&self.data[start..start + len]);
        Ok(())
    }

    fn write_sectors(&mut self, sector: u32, buf: &[u8], count: u32, repeat_same: bool) -> Result<()> {
        self.writes += 1;
        self.write_log.push((sector, count, repeat_same));
        if self.fail_all_writes {
            return Err(Error::io("injected write failure"));
        }
        if let Some(bad) = self.fail_write_sector {
            if bad >= sector && bad < sector + count {
                return Err(Error::io("injected write failure"));
            }
        }
        let ss = self.sector_size as usize;
        for i in 0..count as usize {
            let dst = (sector as usize + i) * ss;
            if dst + ss > self.data.len() {
                return Err(Error::io("write past end of disk"));
            }
            let src = if repeat_same { 0 } else { i * ss };
            self.data[dst..dst + ss].copy_from_slice(&buf[src..src + ss]);
        }
        Ok(())
    }

    fn ioctl(&mut self, cmd: DeviceIoctl) -> Result<u32> {
        if let DeviceIoctl::FreeSectors { first, count } = cmd {
            self.freed.push((first, count));
        }
        Ok(0)
    }
}

/// 卷镜像参数
pub(crate) struct ImageParams {
    pub sector_size: u32,
    pub total_sectors: u32,
    pub sectors_per_cluster: u8,
    pub root_entries: u16,
    pub fat_bits: u8,
}

impl ImageParams {
    /// 512 字节扇区、每簇 1 扇区的小 FAT12 卷
    pub fn fat12(total_sectors: u32) -> Self {
        Self {
            sector_size: 512,
            total_sectors,
            sectors_per_cluster: 1,
            root_entries: 64,
            fat_bits: 12,
        }
    }

    /// 满足 FAT16 簇数下限的卷
    pub fn fat16() -> Self {
        Self {
            sector_size: 512,
            total_sectors: 4200,
            sectors_per_cluster: 1,
            root_entries: 64,
            fat_bits: 16,
        }
    }
}

/// 构建一个空卷（BPB + 清零的 FAT 和根目录）
pub(crate) fn build_image(p: &ImageParams) -> RamDisk {
    let mut disk = RamDisk::new(p.sector_size, p.total_sectors);
    let ss = p.sector_size;
    let reserved = 1u32;
    let num_fats = 2u32;
    let entries = p.total_sectors / p.sectors_per_cluster as u32 + 2;
    let fat_bytes = match p.fat_bits {
        12 => (entries * 3 + 1) / 2,
        16 => entries * 2,
        _ => entries * 4,
    };
    let fat_size = (fat_bytes + ss - 1) / ss;

    {
        let bs = &mut disk.data[..ss as usize];
        bs[0] = 0xEB;
        bs[1] = 0x3C;
        bs[2] = 0x90;
        bs[3..11].copy_from_slice(b"FLASHFAT");
        LittleEndian::write_u16(&mut bs[BPB_BYTES_PER_SECTOR..], ss as u16);
        bs[BPB_SECTORS_PER_CLUSTER] = p.sectors_per_cluster;
        LittleEndian::write_u16(&mut bs[BPB_RESERVED_SECTORS..], reserved as u16);
        bs[BPB_NUM_FATS] = num_fats as u8;
        bs[21] = 0xF8;
        if p.fat_bits == 32 {
            LittleEndian::write_u32(&mut bs[BPB_TOTAL_SECTORS_32..], p.total_sectors);
            LittleEndian::write_u32(&mut bs[BPB_FAT_SIZE_32..], fat_size);
            LittleEndian::write_u32(&mut bs[BPB_ROOT_CLUSTER..], FAT_FIRST_CLUSTER);
        } else {
            LittleEndian::write_u16(&mut bs[BPB_ROOT_ENTRIES..], p.root_entries);
            if p.total_sectors < 0x10000 {
                LittleEndian::write_u16(&mut bs[BPB_TOTAL_SECTORS_16..], p.total_sectors as u16);
            } else {
                LittleEndian::write_u32(&mut bs[BPB_TOTAL_SECTORS_32..], p.total_sectors);
            }
            LittleEndian::write_u16(&mut bs[BPB_FAT_SIZE_16..], fat_size as u16);
        }
        bs[BPB_SIGNATURE] = 0x55;
        bs[BPB_SIGNATURE + 1] = 0xAA;
    }

    // 保留表项 0 和 1
    for fat in 0..num_fats {
        let start = ((reserved + fat * fat_size) * ss) as usize;
        let fat_area = &mut disk.data[start..start + (fat_size * ss) as usize];
        match p.fat_bits {
            12 => fat_area[..3].copy_from_slice(&[0xF8, 0xFF, 0xFF]),
            16 => fat_area[..4].copy_from_slice(&[0xF8, 0xFF, 0xFF, 0xFF]),
            _ => {
                LittleEndian::write_u32(&mut fat_area[0..4], 0x0FFF_FFF8);
                LittleEndian::write_u32(&mut fat_area[4..8], FAT32_EOC);
                // 根目录簇
                LittleEndian::write_u32(&mut fat_area[8..12], FAT32_EOC);
            }
        }
    }
    disk
}

/// 日志调用记录
#[derive(Default)]
pub(crate) struct JournalRecord {
    pub begins: u32,
    pub ends: u32,
    pub errors: u32,
    pub last_error: Option<&'static str>,
    /// 经过日志的写入 (起始扇区, 扇区数)
    pub writes: Vec<(u32, u32)>,
}

/// 共享的日志记录句柄
#[derive(Clone, Default)]
pub(crate) struct JournalLog(pub Rc<RefCell<JournalRecord>>);

impl JournalLog {
    pub fn begins(&self) -> u32 {
        self.0.borrow().begins
    }

    pub fn ends(&self) -> u32 {
        self.0.borrow().ends
    }

    pub fn errors(&self) -> u32 {
        self.0.borrow().errors
    }

    pub fn last_error(&self) -> Option<&'static str> {
        self.0.borrow().last_error
    }

    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.0.borrow().writes.clone()
    }
}

/// 记录调用但不接管写入的日志
pub(crate) struct RecordingJournal {
    log: JournalLog,
}

impl RecordingJournal {
    pub fn new(log: JournalLog) -> Self {
        Self { log }
    }
}

impl Journal for RecordingJournal {
    fn begin(&mut self) -> Result<()> {
        self.log.0.borrow_mut().begins += 1;
        Ok(())
    }

    fn mark_error(&mut self, err: &Error) {
        let mut rec = self.log.0.borrow_mut();
        rec.errors += 1;
        rec.last_error = Some(err.message());
    }

    fn end(&mut self, _dev: &mut dyn BlockDevice) -> Result<()> {
        self.log.0.borrow_mut().ends += 1;
        Ok(())
    }

    fn write_sectors(
        &mut self,
        _dev: &mut dyn BlockDevice,
        sector: u32,
        _buf: &[u8],
        count: u32,
    ) -> Result<bool> {
        self.log.0.borrow_mut().writes.push((sector, count));
        Ok(false)
    }
}

/// 固定时间源（2024-03-15 10:30:20 UTC）
pub(crate) struct FixedTime;

/// [`FixedTime`] 的 UNIX 时间戳
pub(crate) const FIXED_UNIX_SECS: u64 = 1_710_498_620;

impl TimeProvider for FixedTime {
    fn now(&self) -> Option<Duration> {
        Some(Duration::from_secs(FIXED_UNIX_SECS))
    }
}

/// 测试用分组密码：异或后循环左移
pub(crate) struct XorCipher(pub u8);

impl SectorCipher for XorCipher {
    fn block_size(&self) -> usize {
        16
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        for b in block.iter_mut() {
            *b = (*b ^ self.0).rotate_left(3);
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        for b in block.iter_mut() {
            *b = b.rotate_right(3) ^ self.0;
        }
    }
}
