//! 卷配置与公共类型

use crate::fat::AllocMode;
use bitflags::bitflags;
use core::time::Duration;

/// 时间源
///
/// 提供目录项时间戳。
pub trait TimeProvider {
    /// 获取当前时间
    ///
    /// # 返回
    ///
    /// - `Some(Duration)` - 当前时间（从 UNIX 纪元开始）
    /// - `None` - 时间不可用（例如在没有 RTC 的嵌入式系统中）
    ///
    /// # 示例
    ///
    /// ```ignore
    /// struct Rtc;
    /// impl TimeProvider for Rtc {
    ///     fn now(&self) -> Option<Duration> {
    ///         Some(Duration::from_secs(read_rtc()))
    ///     }
    /// }
    /// ```
    fn now(&self) -> Option<Duration>;
}

/// 写入持久性模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// 目录项和分配表链接都推迟到关闭文件时写
    Fast,
    /// 只有文件从空变为非空的那次写同步更新目录项
    Medium,
    /// 每次让文件变长的写都同步更新目录项
    ///
    /// 卷上没有可用时间源时按 `Fast` 处理。
    #[default]
    Safe,
}

/// 卷配置
#[derive(Debug, Clone, Copy)]
pub struct VolumeConfig {
    /// 写入持久性模式
    pub write_mode: WriteMode,
    /// 空闲簇搜索起点
    pub alloc_mode: AllocMode,
    /// 释放目录簇链时的簇数上限
    pub max_dir_clusters: u32,
    /// 整扇区直写要求的缓冲区对齐（字节）
    pub buffer_alignment: usize,
    /// Fast 模式下每段预留的簇数
    pub free_cluster_cache_len: u32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::Safe,
            alloc_mode: AllocMode::NextFree,
            max_dir_clusters: 0x10000,
            buffer_alignment: 1,
            free_cluster_cache_len: 32,
        }
    }
}

bitflags! {
    /// 打开方式
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenMode: u8 {
        /// 读
        const READ = 0x01;
        /// 写
        const WRITE = 0x02;
        /// 不存在时创建
        const CREATE = 0x04;
        /// 打开时截断为 0
        const TRUNCATE = 0x08;
        /// 打开后定位到末尾
        const APPEND = 0x10;
    }
}

/// 卷统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeStats {
    /// 簇大小（字节）
    pub cluster_size: u32,
    /// 总簇数
    pub total_clusters: u32,
    /// 空闲簇数
    pub free_clusters: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = VolumeConfig::default();
        assert_eq!(cfg.write_mode, WriteMode::Safe);
        assert_eq!(cfg.alloc_mode, AllocMode::NextFree);
        assert_eq!(cfg.max_dir_clusters, 0x10000);
        assert_eq!(cfg.buffer_alignment, 1);
    }
}
