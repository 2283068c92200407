//! 多路组相联扇区缓存
//!
//! 缓存位于逻辑块设备之上，持有固定大小的内存预算，划分为若干组，
//! 每组 `2^ld_assoc_level` 路。扇区只能落在 `sector % num_sets` 组内。
//!
//! # 结构
//!
//! ```text
//! SectorCache {
//!     num_bytes,          // 内存预算（4 字节对齐后）
//!     ld_assoc_level,     // log2(每组路数)
//!     sector_size,        // 0 表示尚未从设备推导
//!     num_sets,
//!     modes[type],        // 每种扇区类型的 READ / WRITE / DELAYED_WRITE
//!     blocks[set * ways + way],
//!     data[block * sector_size ..],
//! }
//! ```
//!
//! # 替换策略
//!
//! 每次命中或插入时，被访问块的计数清零，同组其他有效块计数加一
//! （饱和于 0xFFFF）。选择牺牲块时先取第一个无效块，否则取计数最大的块，
//! 计数相同时先遇到的胜出。

use super::{
    block::CacheBlock,
    mode::{CacheMode, SectorType, SectorTypeMask, SECTOR_TYPE_COUNT},
};
use crate::{
    block::BlockDevice,
    consts::*,
    error::{Error, ErrorKind, Result},
};
use alloc::{vec, vec::Vec};
use byteorder::{ByteOrder, LittleEndian};

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 脏块写回次数
    pub write_backs: u64,
    /// 被吸收（未写设备）的写入次数
    pub absorbed_writes: u64,
    /// 替换有效块的次数
    pub evictions: u64,
}

/// 缓存命令（卷层可见的控制接口）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    /// 回写所有脏扇区
    Clean,
    /// 设置若干扇区类型的缓存模式
    SetMode {
        /// 受影响的扇区类型
        types: SectorTypeMask,
        /// 新模式
        mode: CacheMode,
    },
    /// 使所有块失效（不回写）
    Invalidate,
    /// 设置每组路数（2 的幂），重新推导组数
    SetAssocLevel(u32),
    /// 查询能容纳的扇区数
    GetNumSectors,
    /// 丢弃范围内的缓存副本（包括脏数据）
    FreeSectors {
        /// 起始扇区
        first: u32,
        /// 扇区数
        count: u32,
    },
    /// 查询缓存类型
    GetType,
}

/// 组相联扇区缓存
pub struct SectorCache {
    num_bytes: usize,
    ld_assoc_level: u16,
    sector_size: u32,
    num_sets: u32,
    modes: [CacheMode; SECTOR_TYPE_COUNT],
    blocks: Vec<CacheBlock>,
    data: Vec<u8>,
    stats: CacheStats,
}

impl SectorCache {
    /// 创建缓存
    ///
    /// # 参数
    ///
    /// * `region_bytes` - 内存预算，向下对齐到 4 字节
    ///
    /// # 返回
    ///
    /// 预算小于管理结构时返回 `None`（缓存禁用）
    pub fn new(region_bytes: usize) -> Option<Self> {
        let num_bytes = region_bytes & !(CACHE_REGION_ALIGN - 1);
        if num_bytes < CACHE_MANAGEMENT_SIZE {
            return None;
        }
        Some(Self {
            num_bytes,
            ld_assoc_level: CACHE_DEFAULT_ASSOC_LEVEL.trailing_zeros() as u16,
            sector_size: 0,
            num_sets: 0,
            modes: [CacheMode::WRITE_THROUGH; SECTOR_TYPE_COUNT],
            blocks: Vec::new(),
            data: Vec::new(),
            stats: CacheStats::default(),
        })
    }

    /// 从设备推导扇区大小和组数（已推导时不变）
    ///
    /// # 返回
    ///
    /// 能容纳的扇区数
    pub fn configure<D: BlockDevice + ?Sized>(&mut self, dev: &D) -> u32 {
        if self.sector_size == 0 {
            let ss = dev.sector_size();
            self.num_sets = Self::sets_for(self.num_bytes, ss, self.ld_assoc_level);
            self.sector_size = ss;
            let num_blocks = (self.num_sets as usize) << self.ld_assoc_level;
            self.blocks = vec![CacheBlock::INVALID; num_blocks];
            self.data = vec![0u8; num_blocks * ss as usize];
            log::debug!(
                "[CACHE] configured: sector_size={}, sets={}, ways={}",
                ss,
                self.num_sets,
                self.ways()
            );
        }
        self.num_sectors()
    }

    fn sets_for(num_bytes: usize, sector_size: u32, ld_assoc_level: u16) -> u32 {
        let per_set = (CACHE_BLOCK_HEADER_SIZE + sector_size as usize) << ld_assoc_level;
        ((num_bytes - CACHE_MANAGEMENT_SIZE) / per_set) as u32
    }

    // ===== 查询 =====

    /// 每组路数
    pub fn ways(&self) -> usize {
        1 << self.ld_assoc_level
    }

    /// log2(每组路数)
    pub fn ld_assoc_level(&self) -> u16 {
        self.ld_assoc_level
    }

    /// 组数（未推导时为 0）
    pub fn num_sets(&self) -> u32 {
        self.num_sets
    }

    /// 扇区大小（未推导时为 0）
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// 能容纳的扇区数
    pub fn num_sectors(&self) -> u32 {
        self.num_sets << self.ld_assoc_level
    }

    /// 内存预算
    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    /// 某种扇区类型的缓存模式
    pub fn mode(&self, stype: SectorType) -> CacheMode {
        self.modes[stype.index()]
    }

    /// 块头数组（按 `set * ways + way` 排列）
    pub fn blocks(&self) -> &[CacheBlock] {
        &self.blocks
    }

    /// 统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// 扇区是否在缓存中
    pub fn contains(&self, sector: u32) -> bool {
        self.lookup(sector).is_some()
    }

    /// 扇区是否在缓存中且为脏
    pub fn is_dirty(&self, sector: u32) -> bool {
        self.lookup(sector)
            .map(|idx| self.blocks[idx].is_dirty)
            .unwrap_or(false)
    }

    /// 管理结构的二进制形式
    ///
    /// ```text
    /// 0   u32  num_bytes
    /// 4   u16  ld_assoc_level
    /// 8   u32  sector_size
    /// 12  u32  num_sets
    /// 16  u8   mode[management, directory, data]
    /// ```
    pub fn header_bytes(&self) -> [u8; CACHE_MANAGEMENT_SIZE] {
        let mut out = [0u8; CACHE_MANAGEMENT_SIZE];
        LittleEndian::write_u32(&mut out[0..4], self.num_bytes as u32);
        LittleEndian::write_u16(&mut out[4..6], self.ld_assoc_level);
        LittleEndian::write_u32(&mut out[8..12], self.sector_size);
        LittleEndian::write_u32(&mut out[12..16], self.num_sets);
        for (i, mode) in self.modes.iter().enumerate() {
            out[16 + i] = mode.bits();
        }
        out
    }

    // ===== 内部 =====

    fn set_base(&self, sector: u32) -> usize {
        ((sector % self.num_sets) as usize) << self.ld_assoc_level
    }

    fn lookup(&self, sector: u32) -> Option<usize> {
        if self.num_sets == 0 || sector == CACHE_SECTOR_INVALID {
            return None;
        }
        let base = self.set_base(sector);
        (base..base + self.ways()).find(|&i| self.blocks[i].sector_index == sector)
    }

    fn victim(&self, sector: u32) -> usize {
        let base = self.set_base(sector);
        let mut victim = base;
        for i in base..base + self.ways() {
            let block = &self.blocks[i];
            if !block.is_valid() {
                return i;
            }
            if block.access_count > self.blocks[victim].access_count {
                victim = i;
            }
        }
        victim
    }

    fn touch(&mut self, idx: usize) {
        let ways = self.ways();
        let base = idx & !(ways - 1);
        for i in base..base + ways {
            if i == idx {
                self.blocks[i].access_count = 0;
            } else if self.blocks[i].is_valid() {
                self.blocks[i].age();
            }
        }
    }

    fn data_range(&self, idx: usize) -> core::ops::Range<usize> {
        let ss = self.sector_size as usize;
        idx * ss..(idx + 1) * ss
    }

    /// 回写脏块；失败时块被置为无效
    fn write_back<D: BlockDevice + ?Sized>(&mut self, dev: &mut D, idx: usize) -> Result<()> {
        let block = self.blocks[idx];
        if !block.is_valid() || !block.is_dirty {
            return Ok(());
        }
        let range = self.data_range(idx);
        if let Err(e) = dev.write_sectors(block.sector_index, &self.data[range], 1, false) {
            log::warn!(
                "[CACHE] write-back of sector {} failed: {}",
                block.sector_index,
                e
            );
            self.blocks[idx].invalidate();
            return Err(e);
        }
        self.blocks[idx].is_dirty = false;
        self.stats.write_backs += 1;
        Ok(())
    }

    /// 把扇区放入缓存（已存在则覆盖）
    fn store<D: BlockDevice + ?Sized>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        dirty: bool,
    ) -> Result<()> {
        if self.num_sets == 0 {
            return Ok(());
        }
        let idx = match self.lookup(sector) {
            Some(idx) => idx,
            None => {
                let victim = self.victim(sector);
                if self.blocks[victim].is_valid() {
                    self.write_back(dev, victim)?;
                    log::debug!(
                        "[CACHE] evict sector {} for {}",
                        self.blocks[victim].sector_index,
                        sector
                    );
                    self.stats.evictions += 1;
                }
                victim
            }
        };
        let range = self.data_range(idx);
        self.data[range].copy_from_slice(data);
        let block = &mut self.blocks[idx];
        block.sector_index = sector;
        block.is_dirty = dirty;
        self.touch(idx);
        Ok(())
    }

    // ===== 读写路径 =====

    /// 从缓存读取
    ///
    /// # 返回
    ///
    /// 命中返回 `true` 并填充 `buf`；未命中返回 `false`，调用者读设备后
    /// 应调用 [`update_cache`](Self::update_cache)
    pub fn read_from_cache<D: BlockDevice + ?Sized>(
        &mut self,
        dev: &D,
        sector: u32,
        buf: &mut [u8],
    ) -> bool {
        self.configure(dev);
        match self.lookup(sector) {
            Some(idx) => {
                let range = self.data_range(idx);
                buf[..range.len()].copy_from_slice(&self.data[range]);
                self.touch(idx);
                self.stats.hits += 1;
                log::trace!("[CACHE] hit sector {}", sector);
                true
            }
            None => {
                self.stats.misses += 1;
                false
            }
        }
    }

    /// 读取缓存副本但不更新访问计数和统计
    pub fn peek(&self, sector: u32, buf: &mut [u8]) -> bool {
        match self.lookup(sector) {
            Some(idx) => {
                let range = self.data_range(idx);
                buf[..range.len()].copy_from_slice(&self.data[range]);
                true
            }
            None => false,
        }
    }

    /// 设备读之后更新缓存
    ///
    /// 已有干净副本时刷新内容；否则只有该类型开启读缓存时才插入。
    /// 替换脏块前先回写，回写失败则放弃插入并返回错误。
    pub fn update_cache<D: BlockDevice + ?Sized>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        stype: SectorType,
    ) -> Result<()> {
        self.configure(&*dev);
        if let Some(idx) = self.lookup(sector) {
            // 脏副本比设备内容新
            if !self.blocks[idx].is_dirty {
                let range = self.data_range(idx);
                self.data[range].copy_from_slice(&data[..self.sector_size as usize]);
                self.touch(idx);
            }
            return Ok(());
        }
        if !self.modes[stype.index()].contains(CacheMode::READ) {
            return Ok(());
        }
        self.store(dev, sector, &data[..self.sector_size as usize], false)
    }

    /// 写入缓存
    ///
    /// # 返回
    ///
    /// `true` 表示写入被吸收（保持脏），调用者不必写设备；
    /// `false` 表示调用者仍须写设备，缓存副本（如有）已更新且为干净
    pub fn write_into_cache<D: BlockDevice + ?Sized>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        stype: SectorType,
    ) -> Result<bool> {
        self.configure(&*dev);
        if self.num_sets == 0 {
            return Ok(false);
        }
        let data = &data[..self.sector_size as usize];
        let mode = self.modes[stype.index()];

        if mode.contains(CacheMode::WRITE) {
            let absorb = mode.absorbs_writes();
            self.store(dev, sector, data, absorb)?;
            if absorb {
                self.stats.absorbed_writes += 1;
                log::trace!("[CACHE] absorbed write of sector {}", sector);
            }
            return Ok(absorb);
        }

        // 不缓存写入，但不能留下过期副本
        if let Some(idx) = self.lookup(sector) {
            let range = self.data_range(idx);
            self.data[range].copy_from_slice(data);
            self.blocks[idx].is_dirty = false;
            self.touch(idx);
        }
        Ok(false)
    }

    // ===== 维护 =====

    /// 回写所有脏块
    ///
    /// 回写后的块被置为无效。单个块失败不会中止扫描，返回第一个错误。
    pub fn clean<D: BlockDevice + ?Sized>(&mut self, dev: &mut D) -> Result<()> {
        let mut first_err = None;
        let mut written = 0u32;
        for idx in 0..self.blocks.len() {
            let block = self.blocks[idx];
            if !block.is_valid() || !block.is_dirty {
                continue;
            }
            match self.write_back(dev, idx) {
                Ok(()) => {
                    self.blocks[idx].invalidate();
                    written += 1;
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        if written > 0 {
            log::debug!("[CACHE] clean wrote {} sectors", written);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 使所有块失效并要求下次访问重新推导几何参数
    pub fn invalidate_all(&mut self) {
        for block in self.blocks.iter_mut() {
            block.invalidate();
        }
        self.sector_size = 0;
        self.num_sets = 0;
        log::debug!("[CACHE] invalidated");
    }

    /// 丢弃范围内的缓存副本，脏数据不回写
    ///
    /// # 返回
    ///
    /// 被丢弃的块数
    pub fn free_sectors(&mut self, first: u32, count: u32) -> u32 {
        if self.num_sets == 0 || count == 0 {
            return 0;
        }
        let last = first.saturating_add(count);
        let mut dropped = 0;
        for block in self.blocks.iter_mut() {
            if block.is_valid() && block.sector_index >= first && block.sector_index < last {
                block.invalidate();
                dropped += 1;
            }
        }
        dropped
    }

    /// 执行缓存命令
    pub fn command<D: BlockDevice + ?Sized>(&mut self, dev: &mut D, cmd: CacheCommand) -> Result<u32> {
        match cmd {
            CacheCommand::Clean => {
                self.clean(dev)?;
                Ok(0)
            }
            CacheCommand::SetMode { types, mode } => {
                let mut lost_delayed_write = false;
                for stype in SectorType::ALL {
                    if types.contains(stype.mask()) {
                        let old = self.modes[stype.index()];
                        if old.absorbs_writes() && !mode.absorbs_writes() {
                            lost_delayed_write = true;
                        }
                        self.modes[stype.index()] = mode;
                    }
                }
                if lost_delayed_write {
                    self.clean(dev)?;
                }
                Ok(0)
            }
            CacheCommand::Invalidate => {
                self.invalidate_all();
                Ok(0)
            }
            CacheCommand::SetAssocLevel(ways) => {
                if ways == 0 || !ways.is_power_of_two() {
                    return Err(Error::new(
                        ErrorKind::InvalidInput,
                        "Associativity level must be a power of two",
                    ));
                }
                let ld = ways.trailing_zeros() as u16;
                if Self::sets_for(self.num_bytes, dev.sector_size(), ld) == 0 {
                    return Err(Error::new(
                        ErrorKind::InvalidInput,
                        "Associativity level leaves no cache sets",
                    ));
                }
                self.clean(dev)?;
                self.ld_assoc_level = ld;
                self.invalidate_all();
                Ok(self.configure(&*dev))
            }
            CacheCommand::GetNumSectors => Ok(self.configure(&*dev)),
            CacheCommand::FreeSectors { first, count } => Ok(self.free_sectors(first, count)),
            CacheCommand::GetType => Ok(CACHE_TYPE_MULTI_WAY),
        }
    }
}
