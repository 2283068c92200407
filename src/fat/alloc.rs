//! 簇分配、簇链遍历和释放
//!
//! 对应关系：
//!
//! | 操作                          | 方法                                         |
//! |-------------------------------|----------------------------------------------|
//! | 游标推进（必要时分配）        | [`ClusterAllocator::goto_cluster_alloc_if_needed`] |
//! | 分配一个簇并链接              | [`ClusterAllocator::alloc_cluster`]          |
//! | 释放簇链                      | [`ClusterAllocator::free_chain`]             |
//! | 空闲簇缓存落盘                | [`ClusterAllocator::flush_free_cluster_cache`] |
//!
//! # 空闲簇缓存
//!
//! Fast 模式下文件分配簇时不写分配表：分配器为该文件预留一段连续的空闲簇，
//! 依次交给它，链的遍历从预留段读取链接。预留段在文件关闭、其他文件或
//! 目录需要分配、卷同步时写入分配表（段内链接、最后一簇的结束标记、
//! 文件原最后一簇到段首的链接）。同一时刻只有一个预留段，因此不会把
//! 同一个簇分给两个对象。

use super::{
    geometry::VolumeInfo,
    table::{read_entry, write_entry, ReadMode},
};
use crate::{
    block::{BlockDevice, LogicalDev},
    consts::*,
    error::{Error, ErrorKind, Result},
};

/// 打开文件的标识
pub type FileId = u32;

/// 空闲簇搜索起点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocMode {
    /// 从卷上一次分配之后开始
    #[default]
    NextFree,
    /// 从文件当前最后一簇之后开始（新链从头开始）
    FirstFreeAfterStart,
}

/// 分配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPolicy {
    /// 不分配，链结束即报错
    NoAlloc,
    /// 立即写分配表
    Immediate,
    /// 通过空闲簇缓存延迟写分配表
    Deferred(FileId),
}

/// 文件写游标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterCursor {
    /// 当前簇号，0 表示需要从链头重新解析
    pub cluster_id: u32,
    /// 当前簇在链中的序号
    pub cluster_index: u32,
}

impl ClusterCursor {
    /// 失效游标
    pub const INVALID: ClusterCursor = ClusterCursor {
        cluster_id: 0,
        cluster_index: 0,
    };

    /// 游标指向一个簇
    pub fn is_valid(&self) -> bool {
        self.cluster_id != 0
    }

    /// 使游标失效，下次访问从链头解析
    pub fn invalidate(&mut self) {
        *self = Self::INVALID;
    }
}

/// 释放簇链时的长度约束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLimit {
    /// 文件：簇数由文件大小推出
    File { size: u32 },
    /// 目录：没有大小字段，用上限保护
    Directory { max_clusters: u32 },
}

/// 空闲簇缓存（一段为某个文件预留的连续空闲簇）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FreeClusterCache {
    start: u32,
    total: u32,
    in_use: u32,
    owner: Option<FileId>,
    prev_cluster: u32,
}

impl FreeClusterCache {
    /// 预留段所属的文件
    pub fn owner(&self) -> Option<FileId> {
        self.owner
    }

    /// 已交出的簇数
    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    /// 预留的簇数
    pub fn total(&self) -> u32 {
        self.total
    }

    /// 预留段首簇
    pub fn start(&self) -> u32 {
        self.start
    }

    /// 还没有交出任何簇
    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    /// 簇是否已从本段交出
    pub fn contains(&self, cluster: u32) -> bool {
        self.in_use > 0 && cluster >= self.start && cluster < self.start + self.in_use
    }

    fn last(&self) -> u32 {
        self.start + self.in_use - 1
    }
}

/// 簇分配器
pub struct ClusterAllocator {
    mode: AllocMode,
    next_free: u32,
    fcc: FreeClusterCache,
    fcc_len: u32,
}

impl ClusterAllocator {
    /// 创建分配器
    ///
    /// # 参数
    ///
    /// * `mode` - 空闲簇搜索起点
    /// * `fcc_len` - 每段空闲簇缓存预留的簇数，0 表示不使用延迟分配
    pub fn new(mode: AllocMode, fcc_len: u32) -> Self {
        Self {
            mode,
            next_free: FAT_FIRST_CLUSTER,
            fcc: FreeClusterCache::default(),
            fcc_len,
        }
    }

    /// 空闲簇搜索起点
    pub fn mode(&self) -> AllocMode {
        self.mode
    }

    /// 修改空闲簇搜索起点
    pub fn set_mode(&mut self, mode: AllocMode) {
        self.mode = mode;
    }

    /// 下一次 NextFree 搜索的起点
    pub fn next_free_hint(&self) -> u32 {
        self.next_free
    }

    /// 设置 NextFree 搜索起点
    pub fn set_next_free_hint(&mut self, cluster: u32) {
        self.next_free = cluster;
    }

    /// 当前的空闲簇缓存
    pub fn free_cluster_cache(&self) -> &FreeClusterCache {
        &self.fcc
    }

    /// 读取链中 `cluster` 的下一簇（考虑尚未落盘的预留段）
    pub fn next_cluster<D: BlockDevice>(
        &self,
        dev: &mut LogicalDev<D>,
        info: &VolumeInfo,
        cluster: u32,
        rmode: ReadMode,
    ) -> Result<u32> {
        if !self.fcc.is_empty() {
            if self.fcc.contains(cluster) {
                return Ok(if cluster == self.fcc.last() {
                    info.fat_type().eoc()
                } else {
                    cluster + 1
                });
            }
            if self.fcc.prev_cluster != 0 && cluster == self.fcc.prev_cluster {
                return Ok(self.fcc.start);
            }
        }
        read_entry(dev, info, cluster, rmode)
    }

    fn search_start(&self, info: &VolumeInfo, prev: u32) -> u32 {
        let start = match self.mode {
            AllocMode::NextFree => self.next_free,
            AllocMode::FirstFreeAfterStart if prev != 0 => prev + 1,
            AllocMode::FirstFreeAfterStart => FAT_FIRST_CLUSTER,
        };
        if info.is_valid_cluster(start) {
            start
        } else {
            FAT_FIRST_CLUSTER
        }
    }

    fn advance_hint(&mut self, info: &VolumeInfo, last: u32) {
        self.next_free = if last >= info.max_cluster() {
            FAT_FIRST_CLUSTER
        } else {
            last + 1
        };
    }

    /// 从 `start` 开始找第一个空闲簇，到末尾后回绕
    fn find_free<D: BlockDevice>(
        &self,
        dev: &mut LogicalDev<D>,
        info: &VolumeInfo,
        start: u32,
    ) -> Result<Option<u32>> {
        let max = info.max_cluster();
        let mut cluster = start;
        for _ in 0..info.num_clusters() {
            if read_entry(dev, info, cluster, ReadMode::Tracked)? == FAT_ENTRY_FREE {
                return Ok(Some(cluster));
            }
            cluster = if cluster >= max { FAT_FIRST_CLUSTER } else { cluster + 1 };
        }
        Ok(None)
    }

    /// 分配一个簇，链接到 `prev` 之后（`prev` 为 0 表示新链）
    pub fn alloc_cluster<D: BlockDevice>(
        &mut self,
        dev: &mut LogicalDev<D>,
        info: &VolumeInfo,
        prev: u32,
        policy: AllocPolicy,
    ) -> Result<u32> {
        match policy {
            AllocPolicy::NoAlloc => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    "Allocation requested without an allocation policy",
                ))
            }
            AllocPolicy::Deferred(owner) if self.fcc_len > 0 => {
                return self.alloc_deferred(dev, info, prev, owner);
            }
            _ => {}
        }

        // 其他对象的预留段必须先落盘
        self.flush_free_cluster_cache(dev, info)?;

        let start = self.search_start(info, prev);
        let cluster = self
            .find_free(dev, info, start)?
            .ok_or(Error::new(ErrorKind::NoSpace, "No free cluster available"))?;

        // 先写结束标记再链接
        write_entry(dev, info, cluster, info.fat_type().eoc())?;
        if prev != 0 {
            write_entry(dev, info, prev, cluster)?;
        }
        self.advance_hint(info, cluster);
        log::debug!("[FAT] allocated cluster {} after {}", cluster, prev);
        Ok(cluster)
    }

    fn alloc_deferred<D: BlockDevice>(
        &mut self,
        dev: &mut LogicalDev<D>,
        info: &VolumeInfo,
        prev: u32,
        owner: FileId,
    ) -> Result<u32> {
        if self.fcc.owner == Some(owner) && self.fcc.in_use < self.fcc.total {
            let expected_prev = if self.fcc.in_use == 0 {
                self.fcc.prev_cluster
            } else {
                self.fcc.last()
            };
            if prev == expected_prev {
                let cluster = self.fcc.start + self.fcc.in_use;
                self.fcc.in_use += 1;
                log::trace!("[FAT] cluster {} from free cluster cache", cluster);
                return Ok(cluster);
            }
        }

        self.flush_free_cluster_cache(dev, info)?;

        let start = self.search_start(info, prev);
        let first = self
            .find_free(dev, info, start)?
            .ok_or(Error::new(ErrorKind::NoSpace, "No free cluster available"))?;
        let mut total = 1;
        while total < self.fcc_len
            && first + total <= info.max_cluster()
            && read_entry(dev, info, first + total, ReadMode::Tracked)? == FAT_ENTRY_FREE
        {
            total += 1;
        }
        self.fcc = FreeClusterCache {
            start: first,
            total,
            in_use: 1,
            owner: Some(owner),
            prev_cluster: prev,
        };
        log::debug!(
            "[FAT] reserved clusters {}..{} for file {}",
            first,
            first + total,
            owner
        );
        Ok(first)
    }

    /// 把预留段中已交出的簇写入分配表
    ///
    /// 未交出的预留簇在盘上仍为空闲。
    pub fn flush_free_cluster_cache<D: BlockDevice>(
        &mut self,
        dev: &mut LogicalDev<D>,
        info: &VolumeInfo,
    ) -> Result<()> {
        let fcc = core::mem::take(&mut self.fcc);
        if fcc.is_empty() {
            return Ok(());
        }
        if let Err(e) = Self::write_run(dev, info, &fcc) {
            self.fcc = fcc;
            return Err(e);
        }
        self.advance_hint(info, fcc.last());
        log::debug!(
            "[FAT] flushed {} clusters from {} (after {})",
            fcc.in_use,
            fcc.start,
            fcc.prev_cluster
        );
        Ok(())
    }

    fn write_run<D: BlockDevice>(
        dev: &mut LogicalDev<D>,
        info: &VolumeInfo,
        fcc: &FreeClusterCache,
    ) -> Result<()> {
        let last = fcc.last();
        for cluster in fcc.start..=last {
            let value = if cluster == last {
                info.fat_type().eoc()
            } else {
                cluster + 1
            };
            write_entry(dev, info, cluster, value)?;
        }
        if fcc.prev_cluster != 0 {
            write_entry(dev, info, fcc.prev_cluster, fcc.start)?;
        }
        Ok(())
    }

    /// 文件关闭时释放其预留段
    pub fn release<D: BlockDevice>(
        &mut self,
        dev: &mut LogicalDev<D>,
        info: &VolumeInfo,
        owner: FileId,
    ) -> Result<()> {
        if self.fcc.owner == Some(owner) {
            self.flush_free_cluster_cache(dev, info)?;
        }
        Ok(())
    }

    /// 推进游标到链中第 `target_index` 簇，必要时分配
    ///
    /// 文件还没有首簇时先分配首簇。分配失败返回 `NoSpace`，游标停在最后一个
    /// 成功链接的簇，调用者据此更新目录项中的真实大小。
    pub fn goto_cluster_alloc_if_needed<D: BlockDevice>(
        &mut self,
        dev: &mut LogicalDev<D>,
        info: &VolumeInfo,
        first_cluster: &mut u32,
        cursor: &mut ClusterCursor,
        target_index: u32,
        policy: AllocPolicy,
    ) -> Result<()> {
        if *first_cluster != 0 && !info.is_valid_cluster(*first_cluster) {
            return Err(Error::new(ErrorKind::InvalidChain, "Invalid first cluster"));
        }
        if *first_cluster == 0 {
            if policy == AllocPolicy::NoAlloc {
                return Err(Error::new(ErrorKind::InvalidChain, "File has no clusters"));
            }
            let cluster = self.alloc_cluster(dev, info, 0, policy)?;
            *first_cluster = cluster;
            *cursor = ClusterCursor {
                cluster_id: cluster,
                cluster_index: 0,
            };
        }

        if !cursor.is_valid() || cursor.cluster_index > target_index {
            *cursor = ClusterCursor {
                cluster_id: *first_cluster,
                cluster_index: 0,
            };
        }

        while cursor.cluster_index < target_index {
            let next = self.next_cluster(dev, info, cursor.cluster_id, ReadMode::Tracked)?;
            let next = if info.fat_type().is_eoc(next) {
                if policy == AllocPolicy::NoAlloc {
                    return Err(Error::new(
                        ErrorKind::InvalidChain,
                        "Position beyond end of cluster chain",
                    ));
                }
                self.alloc_cluster(dev, info, cursor.cluster_id, policy)?
            } else if !info.is_valid_cluster(next) {
                return Err(Error::new(ErrorKind::InvalidChain, "Broken cluster chain"));
            } else {
                next
            };
            cursor.cluster_id = next;
            cursor.cluster_index += 1;
        }
        Ok(())
    }

    /// 释放从 `first` 开始的簇链
    ///
    /// 文件按大小推出的簇数释放，链中出现空闲或越界表项是硬错误；链比大小长时
    /// 多出的部分不跟随。目录最多释放 `max_clusters` 簇，越过上限或遇到无效链接
    /// 都按成功处理。被释放簇的扇区会从缓存丢弃并通知设备。
    ///
    /// # 返回
    ///
    /// 释放的簇数
    pub fn free_chain<D: BlockDevice>(
        &mut self,
        dev: &mut LogicalDev<D>,
        info: &VolumeInfo,
        first: u32,
        limit: ChainLimit,
    ) -> Result<u32> {
        if first == 0 {
            return Ok(0);
        }
        self.flush_free_cluster_cache(dev, info)?;

        let (bound, is_dir) = match limit {
            ChainLimit::File { size } => {
                let bpc = info.bytes_per_cluster();
                (((size as u64 + bpc as u64 - 1) / bpc as u64).max(1) as u32, false)
            }
            ChainLimit::Directory { max_clusters } => (max_clusters, true),
        };

        let spc = info.sectors_per_cluster();
        let mut run: Option<(u32, u32)> = None;
        let mut cluster = first;
        let mut freed = 0u32;

        let result = loop {
            if !info.is_valid_cluster(cluster) {
                if is_dir {
                    log::warn!("[FAT] directory chain hit invalid cluster {}", cluster);
                    break Ok(());
                }
                break Err(Error::new(ErrorKind::InvalidChain, "Cluster number out of range"));
            }
            if freed == bound {
                log::warn!(
                    "[FAT] chain from {} longer than {} clusters, rest left in place",
                    first,
                    bound
                );
                break Ok(());
            }

            let next = match read_entry(dev, info, cluster, ReadMode::Tracked) {
                Ok(next) => next,
                Err(e) => break Err(e),
            };
            if next == FAT_ENTRY_FREE {
                if is_dir {
                    log::warn!("[FAT] directory chain hit free cluster {}", cluster);
                    break Ok(());
                }
                break Err(Error::new(ErrorKind::InvalidChain, "Free cluster inside chain"));
            }
            if let Err(e) = write_entry(dev, info, cluster, FAT_ENTRY_FREE) {
                break Err(e);
            }
            freed += 1;

            // 连续簇的扇区合并成一次释放提示
            let sector = info.cluster_to_sector(cluster);
            run = match run {
                Some((s, n)) if s + n == sector => Some((s, n + spc)),
                Some((s, n)) => {
                    if let Err(e) = dev.free_sectors(s, n) {
                        break Err(e);
                    }
                    Some((sector, spc))
                }
                None => Some((sector, spc)),
            };

            if info.fat_type().is_eoc(next) {
                if !is_dir && freed < bound {
                    log::warn!(
                        "[FAT] chain from {} ends after {} of {} clusters",
                        first,
                        freed,
                        bound
                    );
                }
                break Ok(());
            }
            cluster = next;
        };

        if let Some((s, n)) = run {
            dev.free_sectors(s, n)?;
        }
        result?;
        log::debug!("[FAT] freed {} clusters from {}", freed, first);
        Ok(freed)
    }

    /// 统计空闲簇
    pub fn count_free<D: BlockDevice>(
        &self,
        dev: &mut LogicalDev<D>,
        info: &VolumeInfo,
    ) -> Result<u32> {
        let mut free = 0;
        for cluster in FAT_FIRST_CLUSTER..=info.max_cluster() {
            if read_entry(dev, info, cluster, ReadMode::Tracked)? == FAT_ENTRY_FREE
                && !self.fcc.contains(cluster)
            {
                free += 1;
            }
        }
        Ok(free)
    }
}
