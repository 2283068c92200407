//! 已挂载的卷

use super::{
    file::File,
    types::{OpenMode, TimeProvider, VolumeConfig, VolumeStats, WriteMode},
};
use crate::{
    block::{BlockDevice, DeviceIoctl, DeviceLock, LogicalDev, NoLock},
    cache::CacheCommand,
    dir::{self, DirEntry, DosDateTime, PathTarget, TreeWalk},
    error::{Error, ErrorKind, Result},
    fat::{ClusterAllocator, FileId, ReadMode, VolumeInfo},
    transaction::TransactionState,
};
use alloc::{boxed::Box, sync::Arc};

/// FAT 卷
///
/// 拥有逻辑设备（连同它的扇区缓存和事务守卫）、分配器和配置。公开操作先取
/// 锁；打开的文件不借用卷，每次读写时把卷传进去。
///
/// # 示例
///
/// ```rust,ignore
/// let dev = LogicalDev::with_cache(flash, 16 * 1024);
/// let mut vol = Volume::mount(dev, VolumeConfig::default(), Arc::new(NoLock), 0)?;
/// vol.set_time_provider(Box::new(Rtc));
///
/// let mut file = vol.create("/log.txt")?;
/// file.write(&mut vol, b"hello")?;
/// file.close(&mut vol)?;
///
/// let flash = vol.unmount()?;
/// ```
pub struct Volume<D: BlockDevice, L: DeviceLock = NoLock> {
    pub(super) dev: LogicalDev<D>,
    pub(super) info: VolumeInfo,
    pub(super) alloc: ClusterAllocator,
    pub(super) config: VolumeConfig,
    time: Option<Box<dyn TimeProvider>>,
    pub(super) lock: Arc<L>,
    pub(super) unit: usize,
    next_file_id: FileId,
}

impl<D: BlockDevice, L: DeviceLock> Volume<D, L> {
    /// 挂载卷
    ///
    /// # 参数
    ///
    /// * `dev` - 逻辑设备（可带缓存和日志）
    /// * `config` - 卷配置
    /// * `lock` - 锁策略，多个卷可共享同一个 `GlobalLock`
    /// * `unit` - 设备单元号，交给锁策略区分设备
    ///
    /// # 错误
    ///
    /// - `ErrorKind::Corrupted` - 引导扇区无效
    /// - `ErrorKind::Io` - 设备读取失败
    pub fn mount(mut dev: LogicalDev<D>, config: VolumeConfig, lock: Arc<L>, unit: usize) -> Result<Self> {
        let info = {
            let _guard = lock.lock(unit);
            VolumeInfo::load(&mut dev)?
        };
        log::info!(
            "[VOLUME] mounted unit {}: {:?}, {} clusters of {} bytes, mode {:?}",
            unit,
            info.fat_type(),
            info.num_clusters(),
            info.bytes_per_cluster(),
            config.write_mode
        );
        Ok(Self {
            dev,
            info,
            alloc: ClusterAllocator::new(config.alloc_mode, config.free_cluster_cache_len),
            config,
            time: None,
            lock,
            unit,
            next_file_id: 1,
        })
    }

    /// 设置时间源
    pub fn set_time_provider(&mut self, provider: Box<dyn TimeProvider>) {
        self.time = Some(provider);
    }

    /// 卷几何
    pub fn info(&self) -> &VolumeInfo {
        &self.info
    }

    /// 当前配置
    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// 切换写入模式
    ///
    /// 离开 Fast 模式时先把预留的空闲簇写入分配表。
    pub fn set_write_mode(&mut self, mode: WriteMode) -> Result<()> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.lock(self.unit);
        if self.config.write_mode == WriteMode::Fast && mode != WriteMode::Fast {
            self.alloc.flush_free_cluster_cache(&mut self.dev, &self.info)?;
        }
        self.config.write_mode = mode;
        Ok(())
    }

    /// 逻辑设备
    pub fn logical_dev(&self) -> &LogicalDev<D> {
        &self.dev
    }

    /// 逻辑设备（可变），挂接日志或查看计数用
    pub fn logical_dev_mut(&mut self) -> &mut LogicalDev<D> {
        &mut self.dev
    }

    /// 簇分配器
    pub fn allocator(&self) -> &ClusterAllocator {
        &self.alloc
    }

    /// 当前时间（DOS 格式）
    pub(super) fn now(&self) -> Option<DosDateTime> {
        self.time.as_ref().and_then(|t| t.now()).map(DosDateTime::from_unix)
    }

    /// 实际生效的写入模式
    ///
    /// 没有可靠时间源时 Safe 降级为 Fast。
    pub(super) fn effective_write_mode(&self) -> WriteMode {
        match self.config.write_mode {
            WriteMode::Safe if self.now().is_none() => WriteMode::Fast,
            mode => mode,
        }
    }

    fn next_id(&mut self) -> FileId {
        let id = self.next_file_id;
        self.next_file_id = self.next_file_id.wrapping_add(1).max(1);
        id
    }

    fn resolve(&mut self, path: &str, rmode: ReadMode) -> Result<PathTarget> {
        let max = self.config.max_dir_clusters;
        dir::resolve_path(&mut self.dev, &self.info, &self.alloc, path, rmode, max)
    }

    /// 查询路径对应的目录项
    pub fn entry(&mut self, path: &str) -> Result<DirEntry> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.lock(self.unit);
        match self.resolve(path, ReadMode::Tracked)? {
            PathTarget::Entry { entry, .. } => Ok(entry),
            PathTarget::Root => Err(Error::new(ErrorKind::InvalidInput, "Root has no directory entry")),
        }
    }

    /// 打开文件
    ///
    /// # 错误
    ///
    /// - `ErrorKind::NotFound` - 文件不存在且没有 `CREATE`
    /// - `ErrorKind::InvalidInput` - 路径是目录
    pub fn open(&mut self, path: &str, mode: OpenMode) -> Result<File> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.lock(self.unit);

        let found = match self.resolve(path, ReadMode::Tracked) {
            Ok(PathTarget::Entry { pos, entry, .. }) => Some((pos, entry)),
            Ok(PathTarget::Root) => None,
            Err(e) if e.kind() == ErrorKind::NotFound && mode.contains(OpenMode::CREATE) => None,
            Err(e) => return Err(e),
        };

        let (pos, mut entry) = match found {
            Some((_, entry)) if entry.is_dir() => {
                return Err(Error::new(ErrorKind::InvalidInput, "Is a directory"))
            }
            Some(found) => found,
            None if mode.contains(OpenMode::CREATE) => {
                self.dev.begin_transaction()?;
                let r = self.create_file_inner(path);
                self.dev.end_transaction(r)?
            }
            None => return Err(Error::new(ErrorKind::InvalidInput, "Is a directory")),
        };

        if mode.contains(OpenMode::TRUNCATE) && (entry.size != 0 || entry.first_cluster != 0) {
            self.dev.begin_transaction()?;
            let r = self.truncate_inner(pos, &entry);
            self.dev.end_transaction(r)?;
            entry.size = 0;
            entry.first_cluster = 0;
        }

        let id = self.next_id();
        log::debug!("[VOLUME] open {} as file {}", path, id);
        Ok(File::new(id, pos, &entry, mode))
    }

    /// 创建（或截断）文件并以读写方式打开
    pub fn create(&mut self, path: &str) -> Result<File> {
        self.open(
            path,
            OpenMode::READ | OpenMode::WRITE | OpenMode::CREATE | OpenMode::TRUNCATE,
        )
    }

    fn create_file_inner(&mut self, path: &str) -> Result<(dir::DirEntryPos, DirEntry)> {
        let max = self.config.max_dir_clusters;
        let (parent, name) = dir::resolve_parent(&mut self.dev, &self.info, &self.alloc, path, max)?;
        let now = self.now().unwrap_or(DosDateTime::EPOCH);
        dir::create_file(&mut self.dev, &self.info, &mut self.alloc, parent, name, now, max)
    }

    fn truncate_inner(&mut self, pos: dir::DirEntryPos, entry: &DirEntry) -> Result<()> {
        let now = self.now();
        dir::update_dir_entry(&mut self.dev, &self.info, pos, 0, 0, now, true)?;
        self.alloc.free_chain(
            &mut self.dev,
            &self.info,
            entry.first_cluster,
            dir::chain_limit(entry, self.config.max_dir_clusters),
        )?;
        Ok(())
    }

    /// 创建目录
    pub fn create_dir(&mut self, path: &str) -> Result<()> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.lock(self.unit);
        self.dev.begin_transaction()?;
        let r = self.create_dir_inner(path);
        self.dev.end_transaction(r)
    }

    fn create_dir_inner(&mut self, path: &str) -> Result<()> {
        let max = self.config.max_dir_clusters;
        let (parent, name) = dir::resolve_parent(&mut self.dev, &self.info, &self.alloc, path, max)?;
        let now = self.now().unwrap_or(DosDateTime::EPOCH);
        dir::create_dir(&mut self.dev, &self.info, &mut self.alloc, parent, name, now, max)?;
        Ok(())
    }

    /// 删除文件
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.lock(self.unit);
        let (pos, entry) = match self.resolve(path, ReadMode::Tracked)? {
            PathTarget::Entry { pos, entry, .. } => (pos, entry),
            PathTarget::Root => return Err(Error::new(ErrorKind::InvalidInput, "Is a directory")),
        };
        self.dev.begin_transaction()?;
        let r = dir::remove_file(&mut self.dev, &self.info, &mut self.alloc, pos, &entry);
        self.dev.end_transaction(r)
    }

    /// 递归删除目录
    ///
    /// `max_recursion_level` 为 0 时只能删除空目录；负数表示不限层数。预算不足
    /// 时返回 `NotEmpty`，卷上和缓存中的内容都不变。
    pub fn remove_dir_tree(&mut self, path: &str, max_recursion_level: i32) -> Result<()> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.lock(self.unit);

        let (pos, entry) = match self.resolve(path, ReadMode::Untracked)? {
            PathTarget::Entry { pos, entry, .. } if entry.is_dir() && !entry.is_dot() => (pos, entry),
            PathTarget::Entry { entry, .. } if !entry.is_dir() => {
                return Err(Error::new(ErrorKind::InvalidInput, "Not a directory"))
            }
            _ => return Err(Error::new(ErrorKind::InvalidInput, "Cannot remove this directory")),
        };
        let max = self.config.max_dir_clusters;

        dir::delete_directory_tree(
            &mut self.dev,
            &self.info,
            &mut self.alloc,
            entry.first_cluster,
            max_recursion_level,
            max,
            TreeWalk::Check,
        )?;

        self.dev.begin_transaction()?;
        let r = self.remove_dir_tree_inner(pos, &entry, max_recursion_level);
        self.dev.end_transaction(r)?;
        log::debug!("[VOLUME] removed directory tree {}", path);
        Ok(())
    }

    fn remove_dir_tree_inner(&mut self, pos: dir::DirEntryPos, entry: &DirEntry, budget: i32) -> Result<()> {
        let max = self.config.max_dir_clusters;
        dir::delete_directory_tree(
            &mut self.dev,
            &self.info,
            &mut self.alloc,
            entry.first_cluster,
            budget,
            max,
            TreeWalk::Delete,
        )?;
        dir::delete_entry(&mut self.dev, &self.info, pos)?;
        self.alloc
            .free_chain(&mut self.dev, &self.info, entry.first_cluster, dir::chain_limit(entry, max))?;
        Ok(())
    }

    /// 卷统计
    pub fn stats(&mut self) -> Result<VolumeStats> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.lock(self.unit);
        Ok(VolumeStats {
            cluster_size: self.info.bytes_per_cluster(),
            total_clusters: self.info.num_clusters(),
            free_clusters: self.alloc.count_free(&mut self.dev, &self.info)?,
        })
    }

    /// 缓存命令
    pub fn cache_command(&mut self, cmd: CacheCommand) -> Result<u32> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.lock(self.unit);
        self.dev.cache_command(cmd)
    }

    /// 同步
    ///
    /// 把空闲簇缓存写入分配表，回写扇区缓存，再让驱动同步。打开文件推迟的
    /// 目录项更新不在这里写，要等文件关闭。
    pub fn sync(&mut self) -> Result<()> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.lock(self.unit);
        self.sync_inner()
    }

    fn sync_inner(&mut self) -> Result<()> {
        let fcc = self.alloc.flush_free_cluster_cache(&mut self.dev, &self.info);
        let flush = self.dev.flush();
        fcc.and(flush)
    }

    /// 卸载
    ///
    /// 同步后使缓存失效并通知驱动，返回底层设备。
    ///
    /// # 错误
    ///
    /// - `ErrorKind::InvalidState` - 逻辑设备上还有未结束的事务
    pub fn unmount(mut self) -> Result<D> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.lock(self.unit);
        if self.dev.transaction().state() != TransactionState::Idle {
            return Err(Error::new(ErrorKind::InvalidState, "Unmount inside a transaction"));
        }
        self.sync_inner()?;
        self.dev.invalidate_cache();
        self.dev.device_mut().ioctl(DeviceIoctl::Unmount)?;
        log::info!("[VOLUME] unit {} unmounted", self.unit);
        Ok(self.dev.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block::{GlobalLock, PerDeviceLock},
        cache::{CacheMode, SectorTypeMask},
        fat::read_entry,
        testing::{build_image, FixedTime, ImageParams, RamDisk},
    };
    use alloc::{vec, vec::Vec};

    fn mount(config: VolumeConfig) -> Volume<RamDisk> {
        let disk = build_image(&ImageParams::fat12(200));
        let mut vol = Volume::mount(LogicalDev::new(disk), config, Arc::new(NoLock), 0).unwrap();
        vol.set_time_provider(Box::new(FixedTime));
        vol
    }

    fn fat<L: DeviceLock>(vol: &mut Volume<RamDisk, L>, cluster: u32) -> u32 {
        let info = *vol.info();
        read_entry(vol.logical_dev_mut(), &info, cluster, ReadMode::Untracked).unwrap()
    }

    fn write_file<L: DeviceLock>(vol: &mut Volume<RamDisk, L>, path: &str, data: &[u8]) {
        let mut file = vol.create(path).unwrap();
        file.write(vol, data).unwrap();
        file.close(vol).unwrap();
    }

    #[test]
    fn test_open_missing_and_directory() {
        let mut vol = mount(VolumeConfig::default());
        let err = vol.open("/none.txt", OpenMode::READ).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        vol.create_dir("/logs").unwrap();
        let err = vol.open("/logs", OpenMode::READ).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(vol.create_dir("/logs").unwrap_err().kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_nested_file_round_trip() {
        let mut vol = mount(VolumeConfig::default());
        vol.create_dir("/logs").unwrap();
        let data: Vec<u8> = (0..1300u32).map(|i| (i * 7) as u8).collect();
        write_file(&mut vol, "/logs/day1.bin", &data);

        let entry = vol.entry("/logs/day1.bin").unwrap();
        assert_eq!(entry.size, 1300);
        assert!(entry.attr.contains(crate::dir::FileAttributes::ARCHIVE));

        let mut file = vol.open("/logs/day1.bin", OpenMode::READ).unwrap();
        let mut out = vec![0u8; 2000];
        assert_eq!(file.read(&mut vol, &mut out).unwrap(), 1300);
        assert_eq!(&out[..1300], &data[..]);
        assert_eq!(file.read(&mut vol, &mut out).unwrap(), 0);
        file.close(&mut vol).unwrap();
        assert_eq!(file.close(&mut vol).unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_append_mode_starts_at_end() {
        let mut vol = mount(VolumeConfig::default());
        write_file(&mut vol, "/a.txt", b"abc");

        let mut file = vol.open("/a.txt", OpenMode::WRITE | OpenMode::APPEND).unwrap();
        assert_eq!(file.position(), 3);
        file.write(&mut vol, b"def").unwrap();
        file.close(&mut vol).unwrap();

        let mut file = vol.open("/a.txt", OpenMode::READ).unwrap();
        let mut out = [0u8; 8];
        assert_eq!(file.read(&mut vol, &mut out).unwrap(), 6);
        assert_eq!(&out[..6], b"abcdef");
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let mut vol = mount(VolumeConfig::default());
        let free = vol.stats().unwrap().free_clusters;
        write_file(&mut vol, "/t.bin", &[1u8; 1500]);
        assert_eq!(vol.stats().unwrap().free_clusters, free - 3);

        let file = vol.create("/t.bin").unwrap();
        assert_eq!(file.size(), 0);
        assert_eq!(file.first_cluster(), 0);
        assert_eq!(vol.entry("/t.bin").unwrap().size, 0);
        assert_eq!(vol.stats().unwrap().free_clusters, free);
    }

    #[test]
    fn test_remove_file_releases_clusters() {
        let mut vol = mount(VolumeConfig::default());
        let free = vol.stats().unwrap().free_clusters;
        write_file(&mut vol, "/r.bin", &[9u8; 1100]);
        vol.remove_file("/r.bin").unwrap();

        assert_eq!(vol.entry("/r.bin").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(vol.stats().unwrap().free_clusters, free);
        assert_eq!(fat(&mut vol, 2), 0);
    }

    #[test]
    fn test_remove_dir_tree_respects_budget() {
        let disk = build_image(&ImageParams::fat12(200));
        let dev = LogicalDev::with_cache(disk, 20 + 16 * 520);
        let mut vol = Volume::mount(dev, VolumeConfig::default(), Arc::new(NoLock), 0).unwrap();
        vol.set_time_provider(Box::new(FixedTime));
        let free = vol.stats().unwrap().free_clusters;

        vol.create_dir("/top").unwrap();
        vol.create_dir("/top/sub").unwrap();
        write_file(&mut vol, "/top/a.txt", b"aaaa");
        write_file(&mut vol, "/top/sub/b.txt", &[2u8; 700]);
        vol.sync().unwrap();

        let before = vol.logical_dev().device().data.clone();
        let writes = vol.logical_dev().device().writes;
        let blocks = vol.logical_dev().cache().unwrap().blocks().to_vec();
        let err = vol.remove_dir_tree("/top", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotEmpty);
        // 失败的删除连访问计数都不动
        assert_eq!(vol.logical_dev().cache().unwrap().blocks(), &blocks[..]);
        let err = vol.remove_dir_tree("/top", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotEmpty);
        let err = vol.remove_dir_tree("/top", 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotEmpty);
        assert_eq!(vol.logical_dev().device().data, before);
        assert_eq!(vol.logical_dev().device().writes, writes);
        assert!(vol.entry("/top/sub/b.txt").is_ok());

        vol.remove_dir_tree("/top", -1).unwrap();
        assert_eq!(vol.entry("/top").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(vol.stats().unwrap().free_clusters, free);
    }

    #[test]
    fn test_remove_dir_tree_rejects_files() {
        let mut vol = mount(VolumeConfig::default());
        write_file(&mut vol, "/f.txt", b"x");
        let err = vol.remove_dir_tree("/f.txt", -1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = vol.remove_dir_tree("/", -1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_sync_flushes_reserved_clusters_only() {
        let mut vol = mount(VolumeConfig {
            write_mode: WriteMode::Fast,
            ..VolumeConfig::default()
        });
        let mut file = vol.create("/f.bin").unwrap();
        file.write(&mut vol, &[3u8; 600]).unwrap();
        assert_eq!(fat(&mut vol, 2), 0);

        vol.sync().unwrap();
        assert_eq!(fat(&mut vol, 2), 3);
        assert!(vol.info().fat_type().is_eoc(fat(&mut vol, 3)));
        // 目录项要等文件关闭
        let pos = file.dir_entry_pos();
        let raw = vol.logical_dev().device().sector(pos.sector);
        assert_eq!(DirEntry::decode(&raw[pos.offset()..]).size, 0);

        file.write(&mut vol, &[4u8; 500]).unwrap();
        file.close(&mut vol).unwrap();
        assert_eq!(fat(&mut vol, 3), 4);
        assert_eq!(vol.entry("/f.bin").unwrap().size, 1100);
    }

    #[test]
    fn test_leaving_fast_mode_flushes_reservation() {
        let mut vol = mount(VolumeConfig {
            write_mode: WriteMode::Fast,
            ..VolumeConfig::default()
        });
        let mut file = vol.create("/f.bin").unwrap();
        file.write(&mut vol, b"0123456789").unwrap();
        assert!(vol.allocator().free_cluster_cache().owner().is_some());

        vol.set_write_mode(WriteMode::Safe).unwrap();
        assert!(vol.allocator().free_cluster_cache().owner().is_none());
        assert!(vol.info().fat_type().is_eoc(fat(&mut vol, 2)));

        file.write(&mut vol, b"abc").unwrap();
        assert_eq!(vol.entry("/f.bin").unwrap().size, 13);
        file.close(&mut vol).unwrap();
    }

    #[test]
    fn test_shared_global_lock_is_released() {
        let lock = Arc::new(GlobalLock::new());
        let mut a: Volume<RamDisk, GlobalLock> = Volume::mount(
            LogicalDev::new(build_image(&ImageParams::fat12(200))),
            VolumeConfig::default(),
            Arc::clone(&lock),
            0,
        )
        .unwrap();
        let mut b: Volume<RamDisk, GlobalLock> = Volume::mount(
            LogicalDev::new(build_image(&ImageParams::fat16())),
            VolumeConfig::default(),
            Arc::clone(&lock),
            1,
        )
        .unwrap();

        write_file(&mut a, "/a.txt", b"volume a");
        write_file(&mut b, "/b.txt", b"volume b");
        assert!(!lock.is_locked());
        assert_eq!(a.entry("/a.txt").unwrap().size, 8);
        assert_eq!(b.entry("/b.txt").unwrap().size, 8);
        assert_eq!(b.info().fat_type(), crate::fat::FatType::Fat16);
    }

    #[test]
    fn test_per_device_lock_units() {
        let lock = Arc::new(PerDeviceLock::new(2));
        let mut vol: Volume<RamDisk, PerDeviceLock> = Volume::mount(
            LogicalDev::new(build_image(&ImageParams::fat12(200))),
            VolumeConfig::default(),
            Arc::clone(&lock),
            1,
        )
        .unwrap();
        write_file(&mut vol, "/x.txt", b"x");
        assert!(!lock.is_locked(0));
        assert!(!lock.is_locked(1));
    }

    #[test]
    fn test_unmount_rejects_open_transaction() {
        let mut vol = mount(VolumeConfig::default());
        vol.logical_dev_mut().begin_transaction().unwrap();
        let err = vol.unmount().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_corrupt_first_cluster_is_rejected() {
        let mut vol = mount(VolumeConfig::default());
        let mut file = vol.create("/bad.bin").unwrap();
        file.write(&mut vol, &[7u8; 600]).unwrap();
        let pos = file.dir_entry_pos();
        file.close(&mut vol).unwrap();
        // 把目录项里的首簇改成保留值 1
        let off = pos.sector as usize * 512 + pos.offset();
        let data = &mut vol.logical_dev_mut().device_mut().data;
        data[off + 20..off + 22].copy_from_slice(&0u16.to_le_bytes());
        data[off + 26..off + 28].copy_from_slice(&1u16.to_le_bytes());

        let mut file = vol.open("/bad.bin", OpenMode::READ | OpenMode::WRITE).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(file.read(&mut vol, &mut buf).unwrap_err().kind(), ErrorKind::InvalidChain);
        let mut file = vol.open("/bad.bin", OpenMode::WRITE).unwrap();
        file.seek(520).unwrap();
        assert_eq!(file.write(&mut vol, b"tail").unwrap_err().kind(), ErrorKind::InvalidChain);

        // 有长度却没有首簇
        let data = &mut vol.logical_dev_mut().device_mut().data;
        data[off + 26..off + 28].copy_from_slice(&0u16.to_le_bytes());
        let free = vol.stats().unwrap().free_clusters;
        let mut file = vol.open("/bad.bin", OpenMode::WRITE).unwrap();
        assert_eq!(file.write(&mut vol, b"head").unwrap_err().kind(), ErrorKind::InvalidChain);
        assert_eq!(vol.stats().unwrap().free_clusters, free);
    }

    #[test]
    fn test_unmount_writes_back_cache() {
        let disk = build_image(&ImageParams::fat12(200));
        let dev = LogicalDev::with_cache(disk, 20 + 16 * 520);
        let mut vol = Volume::mount(dev, VolumeConfig::default(), Arc::new(NoLock), 0).unwrap();
        vol.set_time_provider(Box::new(FixedTime));
        vol.cache_command(CacheCommand::SetMode {
            types: SectorTypeMask::all(),
            mode: CacheMode::WRITE_BACK,
        })
        .unwrap();

        write_file(&mut vol, "/c.txt", b"hello");
        let data_sector = vol.info().cluster_to_sector(2);
        assert_eq!(&vol.logical_dev().device().sector(data_sector)[..5], &[0u8; 5]);

        let disk = vol.unmount().unwrap();
        assert_eq!(&disk.sector(data_sector)[..5], b"hello");

        // 重新挂载能看到文件
        let mut vol: Volume<RamDisk> =
            Volume::mount(LogicalDev::new(disk), VolumeConfig::default(), Arc::new(NoLock), 0).unwrap();
        assert_eq!(vol.entry("/c.txt").unwrap().size, 5);
    }
}
