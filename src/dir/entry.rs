//! 8.3 短文件名目录项
//!
//! 32 字节布局（小端）：
//!
//! | 偏移 | 字段                 |
//! |------|----------------------|
//! | 0    | 名字 8 + 扩展名 3    |
//! | 11   | 属性                 |
//! | 14   | 创建时间             |
//! | 16   | 创建日期             |
//! | 18   | 访问日期             |
//! | 20   | 首簇高 16 位         |
//! | 22   | 修改时间             |
//! | 24   | 修改日期             |
//! | 26   | 首簇低 16 位         |
//! | 28   | 大小                 |

use super::time::DosDateTime;
use crate::{
    consts::*,
    error::{Error, ErrorKind, Result},
};
use alloc::string::String;
use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};

bitflags! {
    /// 目录项属性
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributes: u8 {
        /// 只读
        const READ_ONLY = 0x01;
        /// 隐藏
        const HIDDEN = 0x02;
        /// 系统文件
        const SYSTEM = 0x04;
        /// 卷标
        const VOLUME_ID = 0x08;
        /// 子目录
        const DIRECTORY = 0x10;
        /// 写入后置位，备份工具清除
        const ARCHIVE = 0x20;
        /// 长文件名片段
        const LONG_NAME = 0x0F;
    }
}

/// 目录项在父目录中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntryPos {
    /// 所在扇区
    pub sector: u32,
    /// 扇区内第几项
    pub index: u32,
}

impl DirEntryPos {
    /// 扇区内字节偏移
    pub fn offset(&self) -> usize {
        self.index as usize * DIR_ENTRY_SIZE
    }
}

/// 目录槽状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// 目录结束（之后的槽都未使用）
    End,
    /// 已删除
    Deleted,
    /// 长文件名片段或卷标
    Ignored,
    /// 有效的短文件名项
    Used,
}

impl SlotState {
    /// 按首字节判断槽位状态
    pub fn of(raw: &[u8]) -> Self {
        match raw[0] {
            DIR_ENTRY_END => SlotState::End,
            DIR_ENTRY_DELETED => SlotState::Deleted,
            _ => {
                let attr = FileAttributes::from_bits_retain(raw[DIR_OFF_ATTR]);
                if attr.contains(FileAttributes::LONG_NAME) || attr.contains(FileAttributes::VOLUME_ID)
                {
                    SlotState::Ignored
                } else {
                    SlotState::Used
                }
            }
        }
    }

    /// 槽位可以放新目录项
    pub fn is_free(self) -> bool {
        matches!(self, SlotState::End | SlotState::Deleted)
    }
}

/// 短文件名目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// 8.3 短文件名（空格填充，无点）
    pub name: [u8; DIR_NAME_LEN],
    /// 属性
    pub attr: FileAttributes,
    /// 创建时间
    pub create: DosDateTime,
    /// 最后修改时间
    pub modified: DosDateTime,
    /// 首簇，空文件为 0
    pub first_cluster: u32,
    /// 文件大小（字节），目录为 0
    pub size: u32,
}

impl DirEntry {
    /// 新目录项
    pub fn new(name: [u8; DIR_NAME_LEN], attr: FileAttributes, first_cluster: u32, now: DosDateTime) -> Self {
        Self {
            name,
            attr,
            create: now,
            modified: now,
            first_cluster,
            size: 0,
        }
    }

    /// 从 32 字节槽解码
    pub fn decode(raw: &[u8]) -> Self {
        let mut name = [0u8; DIR_NAME_LEN];
        name.copy_from_slice(&raw[..DIR_NAME_LEN]);
        let hi = LittleEndian::read_u16(&raw[DIR_OFF_CLUSTER_HIGH..]) as u32;
        let lo = LittleEndian::read_u16(&raw[DIR_OFF_CLUSTER_LOW..]) as u32;
        Self {
            name,
            attr: FileAttributes::from_bits_retain(raw[DIR_OFF_ATTR]),
            create: DosDateTime {
                time: LittleEndian::read_u16(&raw[DIR_OFF_CREATE_TIME..]),
                date: LittleEndian::read_u16(&raw[DIR_OFF_CREATE_DATE..]),
            },
            modified: DosDateTime {
                time: LittleEndian::read_u16(&raw[DIR_OFF_WRITE_TIME..]),
                date: LittleEndian::read_u16(&raw[DIR_OFF_WRITE_DATE..]),
            },
            first_cluster: (hi << 16) | lo,
            size: LittleEndian::read_u32(&raw[DIR_OFF_SIZE..]),
        }
    }

    /// 编码到 32 字节槽（保留字段清零）
    pub fn encode(&self, raw: &mut [u8]) {
        let raw = &mut raw[..DIR_ENTRY_SIZE];
        raw.fill(0);
        raw[..DIR_NAME_LEN].copy_from_slice(&self.name);
        raw[DIR_OFF_ATTR] = self.attr.bits();
        LittleEndian::write_u16(&mut raw[DIR_OFF_CREATE_TIME..], self.create.time);
        LittleEndian::write_u16(&mut raw[DIR_OFF_CREATE_DATE..], self.create.date);
        LittleEndian::write_u16(&mut raw[DIR_OFF_ACCESS_DATE..], self.modified.date);
        write_cluster(raw, self.first_cluster);
        write_modified(raw, self.modified);
        LittleEndian::write_u32(&mut raw[DIR_OFF_SIZE..], self.size);
    }

    /// 是否为子目录
    pub fn is_dir(&self) -> bool {
        self.attr.contains(FileAttributes::DIRECTORY)
    }

    /// "." 或 ".."
    pub fn is_dot(&self) -> bool {
        self.name[0] == b'.'
    }

    /// 可读的名字（"NAME.EXT"）
    pub fn display_name(&self) -> String {
        let base = trim_spaces(&self.name[..8]);
        let ext = trim_spaces(&self.name[8..]);
        let mut out = String::with_capacity(12);
        out.extend(base.iter().map(|&b| b as char));
        if !ext.is_empty() {
            out.push('.');
            out.extend(ext.iter().map(|&b| b as char));
        }
        out
    }
}

/// 写入首簇（高低 16 位拆开）
pub(crate) fn write_cluster(raw: &mut [u8], cluster: u32) {
    LittleEndian::write_u16(&mut raw[DIR_OFF_CLUSTER_HIGH..], (cluster >> 16) as u16);
    LittleEndian::write_u16(&mut raw[DIR_OFF_CLUSTER_LOW..], cluster as u16);
}

/// 写入修改时间和日期
pub(crate) fn write_modified(raw: &mut [u8], dt: DosDateTime) {
    LittleEndian::write_u16(&mut raw[DIR_OFF_WRITE_TIME..], dt.time);
    LittleEndian::write_u16(&mut raw[DIR_OFF_WRITE_DATE..], dt.date);
}

fn trim_spaces(s: &[u8]) -> &[u8] {
    let end = s.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &s[..end]
}

fn is_valid_name_char(c: u8) -> bool {
    c.is_ascii_uppercase()
        || c.is_ascii_digit()
        || b"!#$%&'()-@^_`{}~".contains(&c)
}

/// 把一个路径分量转换成 11 字节短文件名
///
/// 小写字母转为大写；名字最多 8 个字符，扩展名最多 3 个。
pub fn short_name(component: &str) -> Result<[u8; DIR_NAME_LEN]> {
    let mut name = [b' '; DIR_NAME_LEN];
    match component {
        "." => {
            name[0] = b'.';
            return Ok(name);
        }
        ".." => {
            name[..2].copy_from_slice(b"..");
            return Ok(name);
        }
        _ => {}
    }

    let (base, ext) = match component.rfind('.') {
        Some(i) => (&component[..i], &component[i + 1..]),
        None => (component, ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(Error::new(ErrorKind::InvalidInput, "Name does not fit 8.3 format"));
    }
    for (dst, src) in name[..8].iter_mut().zip(base.bytes()) {
        *dst = src.to_ascii_uppercase();
    }
    for (dst, src) in name[8..].iter_mut().zip(ext.bytes()) {
        *dst = src.to_ascii_uppercase();
    }
    let used = base.len();
    if !name[..used].iter().chain(name[8..8 + ext.len()].iter()).all(|&c| is_valid_name_char(c)) {
        return Err(Error::new(ErrorKind::InvalidInput, "Invalid character in name"));
    }
    Ok(name)
}
