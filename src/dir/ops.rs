//! 目录读写
//!
//! 目录有两种：FAT12/16 的固定根目录区，以及由簇链承载的普通目录（FAT32 的
//! 根目录也是簇链）。这里的函数只做单步操作，事务由卷层包裹。

use super::{
    entry::{short_name, write_cluster, write_modified, DirEntry, DirEntryPos, FileAttributes, SlotState},
    time::DosDateTime,
};
use crate::{
    block::{BlockDevice, LogicalDev},
    cache::SectorType,
    consts::*,
    error::{Error, ErrorKind, Result},
    fat::{write_entry, AllocPolicy, ChainLimit, ClusterAllocator, ReadMode, VolumeInfo},
};
use alloc::{vec, vec::Vec};
use byteorder::{ByteOrder, LittleEndian};
use core::ops::ControlFlow;

/// 目录所在位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirLocation {
    /// FAT12/16 固定根目录区
    FixedRoot,
    /// 从该簇开始的簇链
    Cluster(u32),
}

impl DirLocation {
    /// 卷的根目录
    pub fn root(info: &VolumeInfo) -> Self {
        match info.root_cluster() {
            0 => DirLocation::FixedRoot,
            c => DirLocation::Cluster(c),
        }
    }

    /// 目录项里的首簇对应的目录（0 表示根目录）
    pub fn of_cluster(info: &VolumeInfo, cluster: u32) -> Self {
        if cluster == 0 {
            Self::root(info)
        } else {
            DirLocation::Cluster(cluster)
        }
    }

    /// 写入子目录 ".." 的首簇值，根目录记为 0
    fn dotdot_cluster(&self, info: &VolumeInfo) -> u32 {
        match *self {
            DirLocation::FixedRoot => 0,
            DirLocation::Cluster(c) if c == info.root_cluster() => 0,
            DirLocation::Cluster(c) => c,
        }
    }
}

/// 路径解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTarget {
    /// 根目录（没有目录项）
    Root,
    /// 普通目录项
    Entry {
        /// 所在目录
        parent: DirLocation,
        /// 目录项位置
        pos: DirEntryPos,
        /// 目录项内容
        entry: DirEntry,
    },
}

/// 目录遍历的结束状态
#[derive(Debug, Clone, Copy)]
struct WalkEnd {
    /// 访问函数要求停止
    stopped: bool,
    /// 最后访问的簇（固定根目录为 0）
    last_cluster: u32,
    /// 访问过的簇数
    clusters: u32,
}

/// 依次访问目录的每个槽
fn walk<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &ClusterAllocator,
    loc: DirLocation,
    rmode: ReadMode,
    max_clusters: u32,
    visit: &mut dyn FnMut(DirEntryPos, &[u8]) -> ControlFlow<()>,
) -> Result<WalkEnd> {
    let ss = info.bytes_per_sector() as usize;
    let mut buf = vec![0u8; ss];

    let mut scan_sector = |dev: &mut LogicalDev<D>, sector: u32| -> Result<ControlFlow<()>> {
        match rmode {
            ReadMode::Tracked => dev.read_sector(sector, &mut buf, SectorType::Directory)?,
            ReadMode::Untracked => dev.read_sector_untracked(sector, &mut buf)?,
        }
        for (index, raw) in buf.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
            let pos = DirEntryPos {
                sector,
                index: index as u32,
            };
            if visit(pos, raw).is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    };

    match loc {
        DirLocation::FixedRoot => {
            let first = info.first_root_sector();
            for sector in first..first + info.root_dir_sectors() {
                if scan_sector(dev, sector)?.is_break() {
                    return Ok(WalkEnd {
                        stopped: true,
                        last_cluster: 0,
                        clusters: 0,
                    });
                }
            }
            Ok(WalkEnd {
                stopped: false,
                last_cluster: 0,
                clusters: 0,
            })
        }
        DirLocation::Cluster(first) => {
            let mut cluster = first;
            let mut clusters = 0;
            loop {
                if !info.is_valid_cluster(cluster) {
                    return Err(Error::new(ErrorKind::InvalidChain, "Broken directory chain"));
                }
                clusters += 1;
                let base = info.cluster_to_sector(cluster);
                for sector in base..base + info.sectors_per_cluster() {
                    if scan_sector(dev, sector)?.is_break() {
                        return Ok(WalkEnd {
                            stopped: true,
                            last_cluster: cluster,
                            clusters,
                        });
                    }
                }
                let next = alloc.next_cluster(dev, info, cluster, rmode)?;
                if info.fat_type().is_eoc(next) || clusters >= max_clusters {
                    return Ok(WalkEnd {
                        stopped: false,
                        last_cluster: cluster,
                        clusters,
                    });
                }
                cluster = next;
            }
        }
    }
}

/// 在目录中查找短文件名
pub fn find_entry<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &ClusterAllocator,
    loc: DirLocation,
    name: &[u8; DIR_NAME_LEN],
    rmode: ReadMode,
    max_clusters: u32,
) -> Result<Option<(DirEntryPos, DirEntry)>> {
    let mut found = None;
    walk(dev, info, alloc, loc, rmode, max_clusters, &mut |pos, raw| {
        match SlotState::of(raw) {
            SlotState::End => ControlFlow::Break(()),
            SlotState::Used if raw[..DIR_NAME_LEN] == name[..] => {
                found = Some((pos, DirEntry::decode(raw)));
                ControlFlow::Break(())
            }
            _ => ControlFlow::Continue(()),
        }
    })?;
    Ok(found)
}

/// 列出目录中的有效项（含 "." 和 ".."）
pub fn list_entries<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &ClusterAllocator,
    loc: DirLocation,
    rmode: ReadMode,
    max_clusters: u32,
) -> Result<Vec<(DirEntryPos, DirEntry)>> {
    let mut entries = Vec::new();
    walk(dev, info, alloc, loc, rmode, max_clusters, &mut |pos, raw| {
        match SlotState::of(raw) {
            SlotState::End => return ControlFlow::Break(()),
            SlotState::Used => entries.push((pos, DirEntry::decode(raw))),
            _ => {}
        }
        ControlFlow::Continue(())
    })?;
    Ok(entries)
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// 解析绝对路径
///
/// `rmode` 为 `Untracked` 时不改变缓存状态，供失败后必须不留痕迹的操作使用。
pub fn resolve_path<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &ClusterAllocator,
    path: &str,
    rmode: ReadMode,
    max_clusters: u32,
) -> Result<PathTarget> {
    let mut loc = DirLocation::root(info);
    let mut target = PathTarget::Root;

    for component in split_path(path) {
        if let PathTarget::Entry { entry, .. } = &target {
            if !entry.is_dir() {
                return Err(Error::new(ErrorKind::NotFound, "Path component is not a directory"));
            }
            loc = DirLocation::of_cluster(info, entry.first_cluster);
        }
        let name = short_name(component)?;
        let (pos, entry) = find_entry(dev, info, alloc, loc, &name, rmode, max_clusters)?
            .ok_or(Error::new(ErrorKind::NotFound, "No such file or directory"))?;
        target = PathTarget::Entry {
            parent: loc,
            pos,
            entry,
        };
    }

    // ".." 指回根目录时按根目录处理
    if let PathTarget::Entry { entry, .. } = &target {
        if entry.is_dir() && entry.is_dot() && entry.first_cluster == 0 {
            return Ok(PathTarget::Root);
        }
    }
    Ok(target)
}

/// 解析父目录并返回最后一个分量的短文件名
pub fn resolve_parent<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &ClusterAllocator,
    path: &str,
    max_clusters: u32,
) -> Result<(DirLocation, [u8; DIR_NAME_LEN])> {
    let path = path.trim_end_matches('/');
    let (dir_path, leaf) = match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    };
    if leaf.is_empty() || leaf == "." || leaf == ".." {
        return Err(Error::new(ErrorKind::InvalidInput, "Invalid file name"));
    }
    let name = short_name(leaf)?;
    let parent = match resolve_path(dev, info, alloc, dir_path, ReadMode::Tracked, max_clusters)? {
        PathTarget::Root => DirLocation::root(info),
        PathTarget::Entry { entry, .. } if entry.is_dir() => {
            DirLocation::of_cluster(info, entry.first_cluster)
        }
        PathTarget::Entry { .. } => {
            return Err(Error::new(ErrorKind::NotFound, "Parent is not a directory"))
        }
    };
    Ok((parent, name))
}

/// 找一个空槽，簇链目录满时扩展一个簇
///
/// 新簇先整簇清零，再链接到目录末尾。
pub fn find_free_slot<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &mut ClusterAllocator,
    loc: DirLocation,
    max_clusters: u32,
) -> Result<DirEntryPos> {
    let mut slot = None;
    let end = walk(dev, info, alloc, loc, ReadMode::Tracked, max_clusters, &mut |pos, raw| {
        if SlotState::of(raw).is_free() {
            slot = Some(pos);
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    })?;
    if let Some(pos) = slot {
        return Ok(pos);
    }
    debug_assert!(!end.stopped);

    if loc == DirLocation::FixedRoot {
        return Err(Error::new(ErrorKind::NoSpace, "Root directory is full"));
    }
    if end.clusters >= max_clusters {
        return Err(Error::new(ErrorKind::NoSpace, "Directory reached its size limit"));
    }

    let cluster = alloc.alloc_cluster(dev, info, 0, AllocPolicy::Immediate)?;
    let sector = info.cluster_to_sector(cluster);
    dev.zero_sectors(sector, info.sectors_per_cluster(), true)?;
    write_entry(dev, info, end.last_cluster, cluster)?;
    log::debug!("[DIR] directory grown by cluster {} after {}", cluster, end.last_cluster);
    Ok(DirEntryPos { sector, index: 0 })
}

/// 读出目录项所在扇区，修改后写回
fn modify_slot<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    pos: DirEntryPos,
    journal: bool,
    f: impl FnOnce(&mut [u8]),
) -> Result<()> {
    let mut buf = vec![0u8; info.bytes_per_sector() as usize];
    dev.read_sector(pos.sector, &mut buf, SectorType::Directory)?;
    let off = pos.offset();
    f(&mut buf[off..off + DIR_ENTRY_SIZE]);
    dev.write_sector(pos.sector, &buf, SectorType::Directory, journal)
}

/// 读取一个目录项
pub fn read_dir_entry<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    pos: DirEntryPos,
) -> Result<DirEntry> {
    let mut buf = vec![0u8; info.bytes_per_sector() as usize];
    dev.read_sector(pos.sector, &mut buf, SectorType::Directory)?;
    Ok(DirEntry::decode(&buf[pos.offset()..]))
}

/// 更新目录项的大小、首簇和修改时间
///
/// 大小只保留低 32 位。`now` 为 `None` 时不改时间戳。
pub fn update_dir_entry<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    pos: DirEntryPos,
    size: u64,
    first_cluster: u32,
    now: Option<DosDateTime>,
    journal: bool,
) -> Result<()> {
    modify_slot(dev, info, pos, journal, |raw| {
        LittleEndian::write_u32(&mut raw[DIR_OFF_SIZE..], size as u32);
        write_cluster(raw, first_cluster);
        if let Some(dt) = now {
            write_modified(raw, dt);
            raw[DIR_OFF_ATTR] |= FileAttributes::ARCHIVE.bits();
        }
    })?;
    log::trace!(
        "[DIR] entry {}:{} size={} first={}",
        pos.sector,
        pos.index,
        size as u32,
        first_cluster
    );
    Ok(())
}

/// 标记目录项为已删除
pub fn delete_entry<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    pos: DirEntryPos,
) -> Result<()> {
    modify_slot(dev, info, pos, true, |raw| raw[0] = DIR_ENTRY_DELETED)
}

/// 在父目录中写入新目录项
pub fn create_entry<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &mut ClusterAllocator,
    parent: DirLocation,
    entry: &DirEntry,
    max_clusters: u32,
) -> Result<DirEntryPos> {
    if find_entry(dev, info, alloc, parent, &entry.name, ReadMode::Tracked, max_clusters)?.is_some() {
        return Err(Error::new(ErrorKind::AlreadyExists, "Entry already exists"));
    }
    let pos = find_free_slot(dev, info, alloc, parent, max_clusters)?;
    modify_slot(dev, info, pos, true, |raw| entry.encode(raw))?;
    log::debug!("[DIR] created {} at {}:{}", entry.display_name(), pos.sector, pos.index);
    Ok(pos)
}

/// 创建空文件（无簇）
pub fn create_file<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &mut ClusterAllocator,
    parent: DirLocation,
    name: [u8; DIR_NAME_LEN],
    now: DosDateTime,
    max_clusters: u32,
) -> Result<(DirEntryPos, DirEntry)> {
    let entry = DirEntry::new(name, FileAttributes::ARCHIVE, 0, now);
    let pos = create_entry(dev, info, alloc, parent, &entry, max_clusters)?;
    Ok((pos, entry))
}

/// 创建子目录（含 "." 和 ".."）
pub fn create_dir<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &mut ClusterAllocator,
    parent: DirLocation,
    name: [u8; DIR_NAME_LEN],
    now: DosDateTime,
    max_clusters: u32,
) -> Result<DirEntryPos> {
    if find_entry(dev, info, alloc, parent, &name, ReadMode::Tracked, max_clusters)?.is_some() {
        return Err(Error::new(ErrorKind::AlreadyExists, "Entry already exists"));
    }

    let cluster = alloc.alloc_cluster(dev, info, 0, AllocPolicy::Immediate)?;
    let first_sector = info.cluster_to_sector(cluster);
    let init = (|| {
        dev.zero_sectors(first_sector, info.sectors_per_cluster(), true)?;
        let mut buf = vec![0u8; info.bytes_per_sector() as usize];
        let mut dot = DirEntry::new(*b".          ", FileAttributes::DIRECTORY, cluster, now);
        dot.encode(&mut buf[..DIR_ENTRY_SIZE]);
        dot.name = *b"..         ";
        dot.first_cluster = parent.dotdot_cluster(info);
        dot.encode(&mut buf[DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE]);
        dev.write_sector(first_sector, &buf, SectorType::Directory, true)?;

        let entry = DirEntry::new(name, FileAttributes::DIRECTORY, cluster, now);
        create_entry(dev, info, alloc, parent, &entry, max_clusters)
    })();

    if let Err(e) = &init {
        // 尽力归还刚分配的簇
        if let Err(free_err) =
            alloc.free_chain(dev, info, cluster, ChainLimit::Directory { max_clusters: 1 })
        {
            log::warn!(
                "[DIR] cluster {} leaked after failed mkdir ({}): {}",
                cluster,
                e,
                free_err
            );
        }
    }
    init
}

/// 删除文件：先删目录项，再释放簇链
pub fn remove_file<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &mut ClusterAllocator,
    pos: DirEntryPos,
    entry: &DirEntry,
) -> Result<()> {
    if entry.is_dir() {
        return Err(Error::new(ErrorKind::InvalidInput, "Is a directory"));
    }
    delete_entry(dev, info, pos)?;
    alloc.free_chain(dev, info, entry.first_cluster, ChainLimit::File { size: entry.size })?;
    log::debug!("[DIR] removed file {}", entry.display_name());
    Ok(())
}
