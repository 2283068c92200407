//! 引导扇区（BPB）解析和卷几何

use crate::{
    block::{BlockDevice, LogicalDev},
    cache::SectorType,
    consts::*,
    error::{Error, ErrorKind, Result},
};
use alloc::vec;
use byteorder::{ByteOrder, LittleEndian};

/// FAT 类型（由簇数决定）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    /// 簇数少于 4085
    Fat12,
    /// 簇数少于 65525
    Fat16,
    /// 其余
    Fat32,
}

impl FatType {
    /// 按簇数判定
    pub fn from_cluster_count(num_clusters: u32) -> Self {
        if num_clusters < FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if num_clusters < FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    /// 链结束标记
    pub fn eoc(self) -> u32 {
        match self {
            FatType::Fat12 => FAT12_EOC,
            FatType::Fat16 => FAT16_EOC,
            FatType::Fat32 => FAT32_EOC,
        }
    }

    /// 表项值是否为链结束（0x?FF8 及以上）
    pub fn is_eoc(self, value: u32) -> bool {
        value >= (self.eoc() & !0x7)
    }

    /// 表项位宽
    pub fn bits(self) -> u32 {
        match self {
            FatType::Fat12 => 12,
            FatType::Fat16 => 16,
            FatType::Fat32 => 32,
        }
    }
}

/// 卷几何信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    fat_type: FatType,
    bytes_per_sector: u32,
    sectors_per_cluster: u32,
    reserved_sectors: u32,
    num_fats: u32,
    fat_size: u32,
    root_entries: u32,
    first_root_sector: u32,
    root_dir_sectors: u32,
    first_data_sector: u32,
    total_sectors: u32,
    num_clusters: u32,
    root_cluster: u32,
}

impl VolumeInfo {
    /// 解析引导扇区
    pub fn parse(boot: &[u8]) -> Result<Self> {
        if boot.len() < 512 {
            return Err(Error::new(ErrorKind::InvalidInput, "Boot sector buffer too small"));
        }
        if boot[BPB_SIGNATURE] != 0x55 || boot[BPB_SIGNATURE + 1] != 0xAA {
            return Err(Error::new(ErrorKind::Corrupted, "Missing boot sector signature"));
        }

        let bytes_per_sector = LittleEndian::read_u16(&boot[BPB_BYTES_PER_SECTOR..]) as u32;
        if !(512..=4096).contains(&bytes_per_sector) || !bytes_per_sector.is_power_of_two() {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid bytes per sector"));
        }
        let sectors_per_cluster = boot[BPB_SECTORS_PER_CLUSTER] as u32;
        if sectors_per_cluster == 0 || !sectors_per_cluster.is_power_of_two() {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid sectors per cluster"));
        }
        let reserved_sectors = LittleEndian::read_u16(&boot[BPB_RESERVED_SECTORS..]) as u32;
        let num_fats = boot[BPB_NUM_FATS] as u32;
        if reserved_sectors == 0 || num_fats == 0 {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid reserved area"));
        }
        let root_entries = LittleEndian::read_u16(&boot[BPB_ROOT_ENTRIES..]) as u32;

        let fat_size = match LittleEndian::read_u16(&boot[BPB_FAT_SIZE_16..]) as u32 {
            0 => LittleEndian::read_u32(&boot[BPB_FAT_SIZE_32..]),
            n => n,
        };
        let total_sectors = match LittleEndian::read_u16(&boot[BPB_TOTAL_SECTORS_16..]) as u32 {
            0 => LittleEndian::read_u32(&boot[BPB_TOTAL_SECTORS_32..]),
            n => n,
        };
        if fat_size == 0 || total_sectors == 0 {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid FAT size or sector count"));
        }

        let root_dir_sectors =
            (root_entries * DIR_ENTRY_SIZE as u32 + bytes_per_sector - 1) / bytes_per_sector;
        let first_root_sector = num_fats
            .checked_mul(fat_size)
            .and_then(|n| n.checked_add(reserved_sectors))
            .ok_or(Error::new(ErrorKind::Corrupted, "FAT region exceeds 32-bit sectors"))?;
        let first_data_sector = first_root_sector
            .checked_add(root_dir_sectors)
            .ok_or(Error::new(ErrorKind::Corrupted, "Root directory exceeds 32-bit sectors"))?;
        if first_data_sector >= total_sectors {
            return Err(Error::new(ErrorKind::Corrupted, "No room for data region"));
        }
        let num_clusters = (total_sectors - first_data_sector) / sectors_per_cluster;
        if num_clusters == 0 {
            return Err(Error::new(ErrorKind::Corrupted, "Data region smaller than one cluster"));
        }
        let fat_type = FatType::from_cluster_count(num_clusters);

        // 表必须容纳最大簇号的表项
        let entries = num_clusters as u64 + FAT_FIRST_CLUSTER as u64;
        let needed = (entries * fat_type.bits() as u64 + 7) / 8;
        if needed > fat_size as u64 * bytes_per_sector as u64 {
            return Err(Error::new(ErrorKind::Corrupted, "FAT too small for cluster count"));
        }

        let root_cluster = if fat_type == FatType::Fat32 {
            if root_entries != 0 {
                return Err(Error::new(ErrorKind::Corrupted, "FAT32 volume with fixed root"));
            }
            LittleEndian::read_u32(&boot[BPB_ROOT_CLUSTER..])
        } else {
            0
        };

        let info = Self {
            fat_type,
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            fat_size,
            root_entries,
            first_root_sector,
            root_dir_sectors,
            first_data_sector,
            total_sectors,
            num_clusters,
            root_cluster,
        };
        if fat_type == FatType::Fat32 && !info.is_valid_cluster(root_cluster) {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid root cluster"));
        }
        Ok(info)
    }

    /// 从设备读取引导扇区
    pub fn load<D: BlockDevice>(dev: &mut LogicalDev<D>) -> Result<Self> {
        let mut buf = vec![0u8; dev.sector_size() as usize];
        dev.read_sector(0, &mut buf, SectorType::Management)?;
        let info = Self::parse(&buf)?;
        if info.bytes_per_sector != dev.sector_size() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Boot sector disagrees with device sector size",
            ));
        }
        log::info!(
            "[VOLUME] {:?}: {} clusters of {} bytes",
            info.fat_type,
            info.num_clusters,
            info.bytes_per_cluster()
        );
        Ok(info)
    }

    /// FAT 类型
    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    /// 扇区大小（字节）
    pub fn bytes_per_sector(&self) -> u32 {
        self.bytes_per_sector
    }

    /// 每簇扇区数
    pub fn sectors_per_cluster(&self) -> u32 {
        self.sectors_per_cluster
    }

    /// 簇大小（字节）
    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector * self.sectors_per_cluster
    }

    /// 保留扇区数（含引导扇区）
    pub fn reserved_sectors(&self) -> u32 {
        self.reserved_sectors
    }

    /// FAT 表份数
    pub fn num_fats(&self) -> u32 {
        self.num_fats
    }

    /// 每份 FAT 表的扇区数
    pub fn fat_size(&self) -> u32 {
        self.fat_size
    }

    /// FAT12/16 固定根目录的项数
    pub fn root_entries(&self) -> u32 {
        self.root_entries
    }

    /// FAT12/16 固定根目录的起始扇区
    pub fn first_root_sector(&self) -> u32 {
        self.first_root_sector
    }

    /// 固定根目录占用的扇区数
    pub fn root_dir_sectors(&self) -> u32 {
        self.root_dir_sectors
    }

    /// 数据区（簇 2）的起始扇区
    pub fn first_data_sector(&self) -> u32 {
        self.first_data_sector
    }

    /// 卷的总扇区数
    pub fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    /// 数据区簇数
    pub fn num_clusters(&self) -> u32 {
        self.num_clusters
    }

    /// FAT32 根目录首簇（FAT12/16 为 0）
    pub fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    /// 最大合法簇号
    pub fn max_cluster(&self) -> u32 {
        self.num_clusters + FAT_FIRST_CLUSTER - 1
    }

    /// 簇号是否落在数据区内
    pub fn is_valid_cluster(&self, cluster: u32) -> bool {
        cluster >= FAT_FIRST_CLUSTER && cluster <= self.max_cluster()
    }

    /// 簇的第一个扇区
    ///
    /// `cluster` 必须是合法簇号，见 [`is_valid_cluster`](Self::is_valid_cluster)。
    pub fn cluster_to_sector(&self, cluster: u32) -> u32 {
        self.first_data_sector + (cluster - FAT_FIRST_CLUSTER) * self.sectors_per_cluster
    }

    /// 第 `fat_index` 份 FAT 表中 `cluster` 表项的位置
    ///
    /// # 返回
    ///
    /// (扇区号, 扇区内字节偏移)
    pub fn fat_entry_location(&self, cluster: u32, fat_index: u32) -> (u32, usize) {
        let byte_offset = match self.fat_type {
            FatType::Fat12 => cluster + cluster / 2,
            FatType::Fat16 => cluster * 2,
            FatType::Fat32 => cluster * 4,
        };
        let sector = self.reserved_sectors
            + fat_index * self.fat_size
            + byte_offset / self.bytes_per_sector;
        (sector, (byte_offset % self.bytes_per_sector) as usize)
    }
}
