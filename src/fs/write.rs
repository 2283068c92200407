//! 文件写入引擎
//!
//! 一次写请求按扇区推进：
//!
//! - 不足一个扇区、缓冲区不满足直写对齐、或文件加密时，走读-改-写；
//!   扇区里没有旧数据（整扇区都在文件末尾之后）时省掉读。
//! - 其余整扇区写进待发的突发写；物理上连续且日志标志相同就并入，
//!   否则先把已攒的突发写发出去。
//! - 只有纯追加（起点在文件末尾或之后）的扇区绕过日志。
//!
//! 文件大小在对应 I/O 完成之前就推进。I/O 失败时大小保持推进后的值，句柄
//! 记下错误，游标失效。

use super::{
    file::File,
    types::{OpenMode, WriteMode},
    volume::Volume,
};
use crate::{
    block::{BlockDevice, DeviceLock},
    cache::SectorType,
    consts::FAT_MAX_FILE_SIZE,
    error::{Error, ErrorKind, Result},
    fat::AllocPolicy,
};
use alloc::{sync::Arc, vec};

/// 待发的突发写
#[derive(Debug, Clone, Copy)]
struct Burst {
    first_sector: u32,
    count: u32,
    journal: bool,
    /// 在源缓冲区中的起点
    src: usize,
}

fn flush_burst<D: BlockDevice, L: DeviceLock>(
    vol: &mut Volume<D, L>,
    data: &[u8],
    burst: &mut Option<Burst>,
) -> Result<()> {
    if let Some(b) = burst.take() {
        let ss = vol.info.bytes_per_sector() as usize;
        let bytes = &data[b.src..b.src + b.count as usize * ss];
        log::trace!(
            "[WRITE] burst of {} sectors at {} (journal {})",
            b.count,
            b.first_sector,
            b.journal
        );
        vol.dev.write_sectors_burst(b.first_sector, bytes, b.count, b.journal)?;
    }
    Ok(())
}

impl File {
    /// 在当前位置写入
    ///
    /// # 返回
    ///
    /// 写入的字节数。卷满时返回已写入的部分；一个字节都没写成时返回
    /// `NoSpace`。
    ///
    /// # 错误
    ///
    /// - `ErrorKind::Io` - 设备写失败，句柄记下错误
    /// - `ErrorKind::NoSpace` - 没有空闲簇，或文件已到 4 GiB 上限
    pub fn write<D: BlockDevice, L: DeviceLock>(
        &mut self,
        vol: &mut Volume<D, L>,
        buf: &[u8],
    ) -> Result<usize> {
        let lock = Arc::clone(&vol.lock);
        let _guard = lock.lock(vol.unit);
        self.check_usable()?;
        if !self.mode.contains(OpenMode::WRITE) {
            return Err(Error::new(ErrorKind::InvalidInput, "File not opened for writing"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if self.first_cluster == 0 && self.size > 0 {
            return Err(Error::new(ErrorKind::InvalidChain, "File has data but no clusters"));
        }
        if self.mode.contains(OpenMode::APPEND) && self.pos != self.size {
            self.pos = self.size;
            self.cursor.invalidate();
        }
        let len = buf.len().min((FAT_MAX_FILE_SIZE - self.pos) as usize);
        if len == 0 {
            return Err(Error::new(ErrorKind::NoSpace, "File size limit reached"));
        }

        let mode = vol.effective_write_mode();
        let old_size = self.size;
        let old_first = self.first_cluster;

        self.dir_entry_dirty = true;
        vol.dev.begin_transaction()?;
        let r = self
            .write_sectors(vol, &buf[..len], mode)
            .and_then(|n| self.update_metadata(vol, mode, old_size, old_first).map(|_| n));
        let r = vol.dev.end_transaction(r);
        if let Err(e) = &r {
            self.record_error(e);
        }
        r
    }

    fn write_sectors<D: BlockDevice, L: DeviceLock>(
        &mut self,
        vol: &mut Volume<D, L>,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<usize> {
        let ss = vol.info.bytes_per_sector();
        let bpc = vol.info.bytes_per_cluster();
        let align = vol.config.buffer_alignment.max(1);
        let policy = match mode {
            WriteMode::Fast => AllocPolicy::Deferred(self.id),
            WriteMode::Medium | WriteMode::Safe => AllocPolicy::Immediate,
        };

        let mut burst: Option<Burst> = None;
        let mut done = 0usize;

        while done < data.len() {
            if let Err(e) = vol.alloc.goto_cluster_alloc_if_needed(
                &mut vol.dev,
                &vol.info,
                &mut self.first_cluster,
                &mut self.cursor,
                self.pos / bpc,
                policy,
            ) {
                flush_burst(vol, data, &mut burst)?;
                if e.kind() == ErrorKind::NoSpace && done > 0 {
                    log::warn!("[WRITE] volume full, file {} stops at {} bytes", self.id, self.size);
                    return Ok(done);
                }
                return Err(e);
            }

            let sector = vol.info.cluster_to_sector(self.cursor.cluster_id) + (self.pos % bpc) / ss;
            let off = (self.pos % ss) as usize;
            let n = (ss as usize - off).min(data.len() - done);
            let src = &data[done..done + n];
            let sector_start = self.pos - off as u32;
            let overwrite = self.pos < self.size;
            let has_old_data = sector_start < self.size;
            let direct =
                n == ss as usize && self.crypt.is_none() && (src.as_ptr() as usize) % align == 0;

            self.pos += n as u32;
            if self.pos > self.size {
                self.size = self.pos;
            }

            if direct {
                let extends = matches!(
                    burst,
                    Some(b) if b.first_sector + b.count == sector && b.journal == overwrite
                );
                if extends {
                    if let Some(b) = burst.as_mut() {
                        b.count += 1;
                    }
                } else {
                    flush_burst(vol, data, &mut burst)?;
                    burst = Some(Burst {
                        first_sector: sector,
                        count: 1,
                        journal: overwrite,
                        src: done,
                    });
                }
            } else {
                flush_burst(vol, data, &mut burst)?;
                self.write_partial(vol, sector, sector_start, off, src, has_old_data, overwrite)?;
            }
            done += n;
        }

        flush_burst(vol, data, &mut burst)?;
        Ok(done)
    }

    /// 读-改-写一个扇区
    #[allow(clippy::too_many_arguments)]
    fn write_partial<D: BlockDevice, L: DeviceLock>(
        &mut self,
        vol: &mut Volume<D, L>,
        sector: u32,
        sector_start: u32,
        off: usize,
        src: &[u8],
        has_old_data: bool,
        journal: bool,
    ) -> Result<()> {
        let ss = vol.info.bytes_per_sector();
        let mut tmp = vec![0u8; ss as usize];
        if has_old_data {
            vol.dev.read_sector(sector, &mut tmp, SectorType::Data)?;
            if let Some(c) = &self.crypt {
                let valid = c.size_encrypted.saturating_sub(sector_start).min(ss) as usize;
                c.decrypt(sector_start, &mut tmp[..valid]);
            }
        }
        tmp[off..off + src.len()].copy_from_slice(src);

        if let Some(c) = &mut self.crypt {
            let valid = (self.size - sector_start).min(ss);
            c.encrypt(sector_start, &mut tmp[..valid as usize]);
            c.size_encrypted = c.size_encrypted.max(sector_start + valid);
        }
        log::trace!(
            "[WRITE] partial sector {} off {} len {} (journal {})",
            sector,
            off,
            src.len(),
            journal
        );
        vol.dev.write_sector(sector, &tmp, SectorType::Data, journal)
    }

    /// 写入后按模式决定目录项何时更新
    fn update_metadata<D: BlockDevice, L: DeviceLock>(
        &mut self,
        vol: &mut Volume<D, L>,
        mode: WriteMode,
        old_size: u32,
        old_first: u32,
    ) -> Result<()> {
        let grew = self.size != old_size || self.first_cluster != old_first;
        let sync_now = grew
            && match mode {
                WriteMode::Safe => true,
                WriteMode::Medium => old_size == 0,
                WriteMode::Fast => false,
            };
        if sync_now {
            self.flush_dir_entry(vol)?;
        }
        Ok(())
    }
}
