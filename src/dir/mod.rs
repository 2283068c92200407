//! 目录模块
//!
//! 只支持 8.3 短文件名。
//!
//! - `entry` - 目录项编解码、短文件名转换
//! - `time` - DOS 日期时间
//! - `ops` - 查找、路径解析、空槽分配与目录扩展、目录项更新和删除
//! - `tree` - 按预算递归删除目录树

mod entry;
mod ops;
mod time;
mod tree;

pub use entry::{short_name, DirEntry, DirEntryPos, FileAttributes, SlotState};
pub use ops::{
    create_dir, create_entry, create_file, delete_entry, find_entry, find_free_slot,
    list_entries, read_dir_entry, remove_file, resolve_parent, resolve_path, update_dir_entry,
    DirLocation, PathTarget,
};
pub use time::DosDateTime;
pub use tree::{delete_directory_tree, TreeWalk};
pub(crate) use tree::chain_limit;
