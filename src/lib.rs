//! flashfat_core: 面向闪存介质的 FAT 文件系统存储核心
//!
//! 提供：
//! - 组相联、按访问计数替换的扇区缓存（直写 / 回写）
//! - FAT12/16/32 簇分配、簇链释放、目录项更新与目录树删除
//! - 带突发写合并、日志参与和三种持久性模式的文件写入引擎
//! - 可选的扇区加密钩子
//!
//! # 示例
//!
//! ```rust,ignore
//! use flashfat_core::{LogicalDev, NoLock, Volume, VolumeConfig, WriteMode};
//!
//! let dev = LogicalDev::with_cache(MyFlash::new(), 16 * 1024);
//! let config = VolumeConfig {
//!     write_mode: WriteMode::Fast,
//!     ..VolumeConfig::default()
//! };
//! let mut vol = Volume::mount(dev, config, Arc::new(NoLock), 0)?;
//!
//! let mut file = vol.create("/log.bin")?;
//! file.write(&mut vol, &samples)?;
//! file.close(&mut vol)?;
//! vol.unmount()?;
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型
//! - [`block`] - 块设备抽象、逻辑设备、锁策略
//! - [`cache`] - 扇区缓存
//! - [`transaction`] - 事务守卫与日志接口
//! - [`fat`] - 卷几何、分配表、簇分配
//! - [`dir`] - 目录项与目录操作
//! - [`crypt`] - 扇区加密
//! - [`fs`] - 卷与文件 API

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 常量定义
pub mod consts;

/// 扇区缓存
pub mod cache;

/// 事务与日志
pub mod transaction;

/// FAT 分配表
pub mod fat;

/// 目录操作
pub mod dir;

/// 扇区加密
pub mod crypt;

/// 卷与文件 API
pub mod fs;

#[cfg(test)]
mod testing;

// ===== 公共导出 =====

pub use error::{Error, ErrorKind, Result};

pub use block::{BlockDevice, DeviceIoctl, DeviceLock, GlobalLock, LogicalDev, NoLock, PerDeviceLock};

pub use cache::{CacheCommand, CacheMode, CacheStats, SectorCache, SectorType};

pub use transaction::{Journal, TransactionGuard, TransactionState};

pub use fat::{AllocMode, ClusterAllocator, FatType, VolumeInfo};

pub use dir::{DirEntry, DirEntryPos, DosDateTime, FileAttributes};

pub use crypt::{EncryptionState, SectorCipher};

#[cfg(feature = "aes")]
pub use crypt::Aes128Cipher;

pub use fs::{File, OpenMode, TimeProvider, Volume, VolumeConfig, VolumeStats, WriteMode};
