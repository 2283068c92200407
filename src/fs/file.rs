//! 文件句柄

use super::{types::OpenMode, volume::Volume};
use crate::{
    block::{BlockDevice, DeviceLock},
    cache::SectorType,
    crypt::{EncryptionState, SectorCipher},
    dir::{self, DirEntry, DirEntryPos},
    error::{Error, ErrorKind, Result},
    fat::{AllocPolicy, ClusterCursor, FileId},
};
use alloc::{boxed::Box, sync::Arc, vec};

/// 文件句柄
///
/// 句柄不借用卷：读写和关闭时把卷传进来。句柄记录目录项位置、首簇、大小、
/// 当前位置和写游标。
///
/// 一旦某次写入遇到 I/O 错误，错误被记下来，之后对这个句柄的读、写和关闭都
/// 先返回它。
///
/// # 示例
///
/// ```rust,ignore
/// let mut file = vol.open("/data.bin", OpenMode::READ)?;
/// let mut buf = vec![0u8; 1024];
/// let n = file.read(&mut vol, &mut buf)?;
/// file.close(&mut vol)?;
/// ```
#[derive(Debug)]
pub struct File {
    pub(super) id: FileId,
    pub(super) dir_pos: DirEntryPos,
    pub(super) first_cluster: u32,
    pub(super) size: u32,
    pub(super) pos: u32,
    pub(super) cursor: ClusterCursor,
    pub(super) mode: OpenMode,
    pub(super) error: Option<Error>,
    /// 目录项有尚未写出的修改
    pub(super) dir_entry_dirty: bool,
    pub(super) crypt: Option<EncryptionState>,
    closed: bool,
}

impl File {
    pub(super) fn new(id: FileId, dir_pos: DirEntryPos, entry: &DirEntry, mode: OpenMode) -> Self {
        let pos = if mode.contains(OpenMode::APPEND) {
            entry.size
        } else {
            0
        };
        Self {
            id,
            dir_pos,
            first_cluster: entry.first_cluster,
            size: entry.size,
            pos,
            cursor: ClusterCursor::INVALID,
            mode,
            error: None,
            dir_entry_dirty: false,
            crypt: None,
            closed: false,
        }
    }

    /// 句柄标识，空闲簇缓存按它区分属主
    pub fn id(&self) -> FileId {
        self.id
    }

    /// 文件大小（字节）
    pub fn size(&self) -> u32 {
        self.size
    }

    /// 当前位置
    pub fn position(&self) -> u32 {
        self.pos
    }

    /// 首簇，还没有数据时为 0
    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }

    /// 目录项位置
    pub fn dir_entry_pos(&self) -> DirEntryPos {
        self.dir_pos
    }

    /// 当前簇游标
    pub fn cursor(&self) -> ClusterCursor {
        self.cursor
    }

    /// 记下的错误
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// 清除记下的错误
    ///
    /// 游标已经失效，下次访问从链头重新解析。
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// 为文件挂上加密
    ///
    /// 已有内容视为用同一密码加密过。
    pub fn set_encryption(&mut self, cipher: Box<dyn SectorCipher>) {
        self.crypt = Some(EncryptionState::new(cipher, self.size));
    }

    /// 加密状态
    pub fn encryption(&self) -> Option<&EncryptionState> {
        self.crypt.as_ref()
    }

    pub(super) fn check_usable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::new(ErrorKind::InvalidState, "File already closed"));
        }
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// 记录 I/O 错误并使游标失效
    pub(super) fn record_error(&mut self, err: &Error) {
        if err.kind() == ErrorKind::Io && self.error.is_none() {
            log::error!("[WRITE] file {} marked failed: {}", self.id, err);
            self.error = Some(err.clone());
        }
        self.cursor.invalidate();
    }

    /// 定位
    ///
    /// 不能越过文件末尾。游标回到链头。
    pub fn seek(&mut self, pos: u32) -> Result<u32> {
        self.check_usable()?;
        if pos > self.size {
            return Err(Error::new(ErrorKind::InvalidInput, "Seek beyond end of file"));
        }
        self.pos = pos;
        self.cursor = if self.first_cluster != 0 {
            ClusterCursor {
                cluster_id: self.first_cluster,
                cluster_index: 0,
            }
        } else {
            ClusterCursor::INVALID
        };
        Ok(pos)
    }

    /// 从当前位置读取
    ///
    /// # 返回
    ///
    /// 实际读取的字节数，到达文件末尾时为 0
    pub fn read<D: BlockDevice, L: DeviceLock>(
        &mut self,
        vol: &mut Volume<D, L>,
        buf: &mut [u8],
    ) -> Result<usize> {
        let lock = Arc::clone(&vol.lock);
        let _guard = lock.lock(vol.unit);
        self.check_usable()?;
        if !self.mode.contains(OpenMode::READ) {
            return Err(Error::new(ErrorKind::InvalidInput, "File not opened for reading"));
        }
        if self.pos >= self.size {
            return Ok(0);
        }
        let len = buf.len().min((self.size - self.pos) as usize);
        match self.read_inner(vol, &mut buf[..len]) {
            Ok(()) => Ok(len),
            Err(e) => {
                self.cursor.invalidate();
                Err(e)
            }
        }
    }

    fn read_inner<D: BlockDevice, L: DeviceLock>(
        &mut self,
        vol: &mut Volume<D, L>,
        buf: &mut [u8],
    ) -> Result<()> {
        let ss = vol.info.bytes_per_sector();
        let bpc = vol.info.bytes_per_cluster();
        let spc = vol.info.sectors_per_cluster();
        let mut tmp = vec![0u8; ss as usize];
        let mut done = 0usize;

        while done < buf.len() {
            vol.alloc.goto_cluster_alloc_if_needed(
                &mut vol.dev,
                &vol.info,
                &mut self.first_cluster,
                &mut self.cursor,
                self.pos / bpc,
                AllocPolicy::NoAlloc,
            )?;
            let in_cluster = (self.pos % bpc) / ss;
            let sector = vol.info.cluster_to_sector(self.cursor.cluster_id) + in_cluster;
            let off = (self.pos % ss) as usize;
            let left = buf.len() - done;

            let n = if off == 0 && self.crypt.is_none() && left >= ss as usize {
                // 同一簇内的整扇区一次读出
                let count = (left as u32 / ss).min(spc - in_cluster);
                let n = (count * ss) as usize;
                vol.dev.read_sectors_burst(sector, &mut buf[done..done + n], count)?;
                n
            } else {
                vol.dev.read_sector(sector, &mut tmp, SectorType::Data)?;
                let sector_start = self.pos - off as u32;
                if let Some(c) = &self.crypt {
                    let valid = c.size_encrypted.saturating_sub(sector_start).min(ss) as usize;
                    c.decrypt(sector_start, &mut tmp[..valid]);
                }
                let n = (ss as usize - off).min(left);
                buf[done..done + n].copy_from_slice(&tmp[off..off + n]);
                n
            };
            self.pos += n as u32;
            done += n;
        }
        Ok(())
    }

    /// 把推迟的目录项更新写出
    pub(super) fn flush_dir_entry<D: BlockDevice, L: DeviceLock>(
        &mut self,
        vol: &mut Volume<D, L>,
    ) -> Result<()> {
        let now = vol.now();
        dir::update_dir_entry(
            &mut vol.dev,
            &vol.info,
            self.dir_pos,
            self.size as u64,
            self.first_cluster,
            now,
            true,
        )?;
        self.dir_entry_dirty = false;
        Ok(())
    }

    /// 关闭文件
    ///
    /// 写出推迟的分配表链接（Fast 模式）和目录项。即使之前的写入已经失败也会
    /// 尽量写出，然后返回记下的错误。
    pub fn close<D: BlockDevice, L: DeviceLock>(&mut self, vol: &mut Volume<D, L>) -> Result<()> {
        let lock = Arc::clone(&vol.lock);
        let _guard = lock.lock(vol.unit);
        if self.closed {
            return Err(Error::new(ErrorKind::InvalidState, "File already closed"));
        }
        self.closed = true;

        vol.dev.begin_transaction()?;
        let r = self.close_inner(vol);
        let r = vol.dev.end_transaction(r);
        log::debug!("[WRITE] file {} closed, size {}", self.id, self.size);
        match self.error.take() {
            Some(e) => Err(e),
            None => r,
        }
    }

    fn close_inner<D: BlockDevice, L: DeviceLock>(&mut self, vol: &mut Volume<D, L>) -> Result<()> {
        vol.alloc.release(&mut vol.dev, &vol.info, self.id)?;
        if self.dir_entry_dirty {
            self.flush_dir_entry(vol)?;
        }
        Ok(())
    }
}
