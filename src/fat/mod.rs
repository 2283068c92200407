//! FAT 分配表模块
//!
//! - `geometry` - 引导扇区解析、FAT 类型和扇区/簇换算
//! - `table` - 表项读写（所有 FAT 副本）
//! - `alloc` - 簇分配、游标推进、簇链释放、空闲簇缓存

mod alloc;
mod geometry;
mod table;

pub use self::alloc::{
    AllocMode, AllocPolicy, ChainLimit, ClusterAllocator, ClusterCursor, FileId,
    FreeClusterCache,
};
pub use geometry::{FatType, VolumeInfo};
pub use table::{read_entry, write_entry, ReadMode};
