//! 扇区缓存模块
//!
//! 每个逻辑设备一个多路组相联写回缓存，内存预算固定，不会动态增长。
//!
//! # 主要组件
//!
//! - [`SectorCache`] - 缓存实例：组/路寻址、替换、回写、命令
//! - [`CacheBlock`] - 块头（扇区号、访问计数、脏标志）
//! - [`CacheMode`] - 每种扇区类型的读 / 写 / 延迟写开关
//! - [`SectorType`] - 扇区类型：管理（FAT 表）、目录、数据
//! - [`CacheCommand`] - 卷层使用的控制命令
//!
//! # 不变量
//!
//! - 同一扇区最多在一个块中
//! - 脏块的扇区号永远不是 `INVALID`
//! - 缓存最多容纳 `num_sets × 2^ld_assoc_level` 个扇区
//!
//! # 使用示例
//!
//! ```rust,ignore
//! let mut dev = LogicalDev::with_cache(flash, 16 * 1024);
//! dev.cache_command(CacheCommand::SetAssocLevel(4))?;
//! dev.cache_command(CacheCommand::SetMode {
//!     types: SectorTypeMask::DATA,
//!     mode: CacheMode::WRITE_BACK,
//! })?;
//! ```

mod block;
mod mode;
mod sector_cache;

pub use block::CacheBlock;
pub use mode::{CacheMode, SectorType, SectorTypeMask, SECTOR_TYPE_COUNT};
pub use sector_cache::{CacheCommand, CacheStats, SectorCache};
