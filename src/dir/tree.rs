//! 递归删除目录树
//!
//! 分两趟：检查趟只读（不改缓存访问计数、不填充缓存），确认预算足够删完整棵
//! 树；删除趟再逐项删除。预算不足时在检查趟就返回 `NotEmpty`，盘上和缓存里
//! 什么都没有变。

use super::{
    entry::DirEntry,
    ops::{delete_entry, list_entries, DirLocation},
};
use crate::{
    block::{BlockDevice, LogicalDev},
    error::{Error, ErrorKind, Result},
    fat::{ChainLimit, ClusterAllocator, ReadMode, VolumeInfo},
};
use alloc::vec::Vec;

/// 遍历趟
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeWalk {
    /// 只读检查
    Check,
    /// 实际删除
    Delete,
}

/// 删除 `dir_cluster` 目录下的全部内容（不含目录自身的目录项和簇链）
///
/// `budget` 是还允许下探的层数：为 0 时目录必须为空，否则返回 `NotEmpty`；
/// 负数表示不限层数。
pub fn delete_directory_tree<D: BlockDevice>(
    dev: &mut LogicalDev<D>,
    info: &VolumeInfo,
    alloc: &mut ClusterAllocator,
    dir_cluster: u32,
    budget: i32,
    max_dir_clusters: u32,
    pass: TreeWalk,
) -> Result<()> {
    let rmode = match pass {
        TreeWalk::Check => ReadMode::Untracked,
        TreeWalk::Delete => ReadMode::Tracked,
    };
    let children: Vec<_> = list_entries(
        dev,
        info,
        alloc,
        DirLocation::Cluster(dir_cluster),
        rmode,
        max_dir_clusters,
    )?
    .into_iter()
    .filter(|(_, e)| !e.is_dot())
    .collect();

    if children.is_empty() {
        return Ok(());
    }
    if budget == 0 {
        log::debug!("[DIR] directory at cluster {} not empty, budget exhausted", dir_cluster);
        return Err(Error::new(ErrorKind::NotEmpty, "Directory not empty"));
    }
    let child_budget = if budget < 0 { budget } else { budget - 1 };

    for (pos, entry) in children {
        if entry.is_dir() && entry.first_cluster != 0 {
            delete_directory_tree(
                dev,
                info,
                alloc,
                entry.first_cluster,
                child_budget,
                max_dir_clusters,
                pass,
            )?;
        }
        if pass == TreeWalk::Delete {
            delete_entry(dev, info, pos)?;
            alloc.free_chain(dev, info, entry.first_cluster, chain_limit(&entry, max_dir_clusters))?;
        }
    }
    Ok(())
}

pub(crate) fn chain_limit(entry: &DirEntry, max_dir_clusters: u32) -> ChainLimit {
    if entry.is_dir() {
        ChainLimit::Directory {
            max_clusters: max_dir_clusters,
        }
    } else {
        ChainLimit::File { size: entry.size }
    }
}
