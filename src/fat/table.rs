//! 分配表（FAT）表项读写
//!
//! 读取只看第一份表；写入更新所有副本，并参与日志。
//! FAT12 表项是 12 位，可能跨越扇区边界，此时读写两个扇区。

use super::geometry::{FatType, VolumeInfo};
use crate::{
    block::{BlockDevice, LogicalDev},
    cache::SectorType,
    consts::*,
    error::{Error, ErrorKind, Result},
};
use alloc::vec;
use byteorder::{ByteOrder, LittleEndian};

/// 表项读取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// 经过缓存（命中更新访问计数，未命中填充缓存）
    Tracked,
    /// 不改变缓存状态
    Untracked,
}

fn read_fat_sector<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    sector: u32,
    buf: &mut [u8],
    mode: ReadMode,
) -> Result<()> {
    match mode {
        ReadMode::Tracked => dev.read_sector(sector, buf, SectorType::Management),
        ReadMode::Untracked => dev.read_sector_untracked(sector, buf),
    }
}

fn check_cluster(info: &VolumeInfo, cluster: u32) -> Result<()> {
    if cluster < FAT_FIRST_CLUSTER || cluster > info.max_cluster() {
        return Err(Error::new(ErrorKind::InvalidChain, "Cluster number out of range"));
    }
    Ok(())
}

/// 读取 `cluster` 的表项
pub fn read_entry<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    cluster: u32,
    mode: ReadMode,
) -> Result<u32> {
    check_cluster(info, cluster)?;
    let ss = info.bytes_per_sector() as usize;
    let (sector, offset) = info.fat_entry_location(cluster, 0);
    let mut buf = vec![0u8; ss];
    read_fat_sector(dev, sector, &mut buf, mode)?;

    let value = match info.fat_type() {
        FatType::Fat12 => {
            let lo = buf[offset] as u16;
            let hi = if offset + 1 < ss {
                buf[offset + 1] as u16
            } else {
                read_fat_sector(dev, sector + 1, &mut buf, mode)?;
                buf[0] as u16
            };
            let raw = lo | (hi << 8);
            if cluster & 1 == 1 {
                (raw >> 4) as u32
            } else {
                (raw & 0x0FFF) as u32
            }
        }
        FatType::Fat16 => LittleEndian::read_u16(&buf[offset..]) as u32,
        FatType::Fat32 => LittleEndian::read_u32(&buf[offset..]) & FAT32_ENTRY_MASK,
    };
    Ok(value)
}

/// 写入 `cluster` 的表项（所有 FAT 副本）
pub fn write_entry<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    cluster: u32,
    value: u32,
) -> Result<()> {
    check_cluster(info, cluster)?;
    let ss = info.bytes_per_sector() as usize;
    let mut buf = vec![0u8; ss];

    for fat_index in 0..info.num_fats() {
        let (sector, offset) = info.fat_entry_location(cluster, fat_index);
        dev.read_sector(sector, &mut buf, SectorType::Management)?;

        match info.fat_type() {
            FatType::Fat12 => {
                let v = (value & 0x0FFF) as u16;
                let odd = cluster & 1 == 1;
                let lo = if odd {
                    (buf[offset] & 0x0F) | ((v << 4) as u8)
                } else {
                    v as u8
                };
                buf[offset] = lo;
                if offset + 1 < ss {
                    let hi = &mut buf[offset + 1];
                    *hi = if odd {
                        (v >> 4) as u8
                    } else {
                        (*hi & 0xF0) | ((v >> 8) as u8)
                    };
                    dev.write_sector(sector, &buf, SectorType::Management, true)?;
                } else {
                    // 跨扇区：高位字节在下一个扇区开头
                    dev.write_sector(sector, &buf, SectorType::Management, true)?;
                    dev.read_sector(sector + 1, &mut buf, SectorType::Management)?;
                    buf[0] = if odd {
                        (v >> 4) as u8
                    } else {
                        (buf[0] & 0xF0) | ((v >> 8) as u8)
                    };
                    dev.write_sector(sector + 1, &buf, SectorType::Management, true)?;
                }
            }
            FatType::Fat16 => {
                LittleEndian::write_u16(&mut buf[offset..], value as u16);
                dev.write_sector(sector, &buf, SectorType::Management, true)?;
            }
            FatType::Fat32 => {
                // 高 4 位保留
                let old = LittleEndian::read_u32(&buf[offset..]);
                let new = (old & !FAT32_ENTRY_MASK) | (value & FAT32_ENTRY_MASK);
                LittleEndian::write_u32(&mut buf[offset..], new);
                dev.write_sector(sector, &buf, SectorType::Management, true)?;
            }
        }
    }
    log::trace!("[FAT] entry {} = {:#x}", cluster, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_image, ImageParams};

    fn fat12_dev() -> (LogicalDev<crate::testing::RamDisk>, VolumeInfo) {
        // 每份 FAT 表 3 个扇区，341 号簇跨越扇区边界
        let disk = build_image(&ImageParams::fat12(700));
        let info = VolumeInfo::parse(disk.sector(0)).unwrap();
        (LogicalDev::new(disk), info)
    }

    #[test]
    fn test_fat12_even_and_odd_entries() {
        let (mut dev, info) = fat12_dev();
        write_entry(&mut dev, &info, 2, 0x123).unwrap();
        write_entry(&mut dev, &info, 3, 0xABC).unwrap();
        assert_eq!(read_entry(&mut dev, &info, 2, ReadMode::Tracked).unwrap(), 0x123);
        assert_eq!(read_entry(&mut dev, &info, 3, ReadMode::Tracked).unwrap(), 0xABC);
        // 字节 3..6: 23 C1 AB
        let fat = dev.device().sector(1);
        assert_eq!(&fat[3..6], &[0x23, 0xC1, 0xAB]);
    }

    #[test]
    fn test_fat12_entry_straddles_sectors() {
        let (mut dev, info) = fat12_dev();
        // 341 + 170 = 511
        assert_eq!(info.fat_entry_location(341, 0), (1, 511));
        write_entry(&mut dev, &info, 341, 0xDEF).unwrap();
        write_entry(&mut dev, &info, 340, 0x456).unwrap();
        assert_eq!(read_entry(&mut dev, &info, 341, ReadMode::Tracked).unwrap(), 0xDEF);
        assert_eq!(read_entry(&mut dev, &info, 340, ReadMode::Untracked).unwrap(), 0x456);
        assert_eq!(dev.device().sector(2)[0], 0xDE);
    }

    #[test]
    fn test_fat16_writes_every_copy() {
        let disk = build_image(&ImageParams::fat16());
        let info = VolumeInfo::parse(disk.sector(0)).unwrap();
        let mut dev = LogicalDev::new(disk);

        write_entry(&mut dev, &info, 300, 0xFFFF).unwrap();
        let (s0, off) = info.fat_entry_location(300, 0);
        let (s1, _) = info.fat_entry_location(300, 1);
        assert_eq!(LittleEndian::read_u16(&dev.device().sector(s0)[off..]), 0xFFFF);
        assert_eq!(LittleEndian::read_u16(&dev.device().sector(s1)[off..]), 0xFFFF);
        assert!(info.fat_type().is_eoc(
            read_entry(&mut dev, &info, 300, ReadMode::Tracked).unwrap()
        ));
    }

    #[test]
    fn test_out_of_range_cluster() {
        let (mut dev, info) = fat12_dev();
        let err = read_entry(&mut dev, &info, 1, ReadMode::Tracked).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidChain);
        let err = write_entry(&mut dev, &info, info.max_cluster() + 1, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidChain);
    }
}
