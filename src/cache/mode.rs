//! 扇区类型与缓存模式
//!
//! 每种扇区类型（管理/目录/数据）各自配置读缓存、写缓存和延迟写。

use bitflags::bitflags;

/// 扇区类型数量
pub const SECTOR_TYPE_COUNT: usize = 3;

/// 扇区类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SectorType {
    /// 管理扇区（引导扇区、FAT 表）
    Management = 0,
    /// 目录扇区
    Directory = 1,
    /// 文件数据扇区
    Data = 2,
}

impl SectorType {
    /// 所有扇区类型
    pub const ALL: [SectorType; SECTOR_TYPE_COUNT] =
        [SectorType::Management, SectorType::Directory, SectorType::Data];

    /// 模式数组下标
    pub fn index(self) -> usize {
        self as usize
    }

    /// 对应的类型掩码位
    pub fn mask(self) -> SectorTypeMask {
        match self {
            SectorType::Management => SectorTypeMask::MANAGEMENT,
            SectorType::Directory => SectorTypeMask::DIRECTORY,
            SectorType::Data => SectorTypeMask::DATA,
        }
    }
}

bitflags! {
    /// 缓存模式
    ///
    /// 延迟写（`DELAYED_WRITE`）只有和 `WRITE` 同时设置才生效
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheMode: u8 {
        /// 读缓存
        const READ          = 0x01;
        /// 写缓存（写入时更新缓存副本）
        const WRITE         = 0x02;
        /// 延迟写（回写，跳过物理写）
        const DELAYED_WRITE = 0x04;

        /// 写穿
        const WRITE_THROUGH = Self::READ.bits() | Self::WRITE.bits();
        /// 回写
        const WRITE_BACK    = Self::READ.bits() | Self::WRITE.bits() | Self::DELAYED_WRITE.bits();
    }
}

bitflags! {
    /// 扇区类型掩码（用于批量设置缓存模式）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectorTypeMask: u8 {
        /// 管理扇区
        const MANAGEMENT = 0x01;
        /// 目录扇区
        const DIRECTORY  = 0x02;
        /// 数据扇区
        const DATA       = 0x04;
    }
}

impl CacheMode {
    /// 写入是否可以只留在缓存中
    pub fn absorbs_writes(self) -> bool {
        self.contains(CacheMode::WRITE | CacheMode::DELAYED_WRITE)
    }
}
