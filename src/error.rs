//! 错误类型定义
//!
//! 提供存储核心（扇区缓存、簇分配、目录修改、文件写入）的错误类型。

use core::fmt;

/// 存储核心操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 设备 I/O 错误（读/写/擦除失败，不在本层重试）
    Io,
    /// 无效参数
    InvalidInput,
    /// 文件系统损坏（无效的引导扇区等）
    Corrupted,
    /// 簇链无效（遍历超出预期长度，或遇到空闲/越界表项）
    InvalidChain,
    /// 文件不存在
    NotFound,
    /// 已存在
    AlreadyExists,
    /// 卷已满（无空闲簇）
    NoSpace,
    /// 不支持的操作
    Unsupported,
    /// 无效状态
    InvalidState,
    /// 目录非空
    NotEmpty,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 设备 I/O 错误的快捷构造
    pub const fn io(message: &'static str) -> Self {
        Self::new(ErrorKind::Io, message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
