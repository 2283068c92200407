//! 缓存块结构
//!
//! 缓存块只保存块头（扇区号、访问计数、脏标志），扇区数据放在
//! [`SectorCache`](super::SectorCache) 的数据区中，按块下标算出偏移。

use crate::consts::{CACHE_ACCESS_COUNT_MAX, CACHE_BLOCK_HEADER_SIZE, CACHE_SECTOR_INVALID};
use byteorder::{ByteOrder, LittleEndian};

/// 缓存块头
///
/// 二进制布局（8 字节，小端）：
///
/// | 偏移 | 字段          | 类型 |
/// |------|---------------|------|
/// | 0    | `sectorIndex` | u32  |
/// | 4    | `accessCount` | u16  |
/// | 6    | `isDirty`     | u16  |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBlock {
    /// 缓存的扇区号，空闲时为 [`CACHE_SECTOR_INVALID`]
    pub sector_index: u32,
    /// 访问计数（越大越久未访问）
    pub access_count: u16,
    /// 是否需要回写
    pub is_dirty: bool,
}

impl CacheBlock {
    /// 空闲块
    pub const INVALID: CacheBlock = CacheBlock {
        sector_index: CACHE_SECTOR_INVALID,
        access_count: 0,
        is_dirty: false,
    };

    /// 是否持有扇区
    pub fn is_valid(&self) -> bool {
        self.sector_index != CACHE_SECTOR_INVALID
    }

    /// 标记为空闲
    pub fn invalidate(&mut self) {
        *self = Self::INVALID;
    }

    /// 访问计数加一（饱和）
    pub fn age(&mut self) {
        if self.access_count < CACHE_ACCESS_COUNT_MAX {
            self.access_count += 1;
        }
    }

    /// 编码块头
    ///
    /// 8 字节：u32 扇区号、u16 访问计数、u16 脏标志。
    pub fn header_bytes(&self) -> [u8; CACHE_BLOCK_HEADER_SIZE] {
        let mut buf = [0u8; CACHE_BLOCK_HEADER_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.sector_index);
        LittleEndian::write_u16(&mut buf[4..6], self.access_count);
        LittleEndian::write_u16(&mut buf[6..8], self.is_dirty as u16);
        buf
    }
}

impl Default for CacheBlock {
    fn default() -> Self {
        Self::INVALID
    }
}
