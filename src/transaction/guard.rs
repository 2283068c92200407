//! 事务守卫
//!
//! 把目录 / FAT 表修改包在 begin/end 之间：
//!
//! 1. **嵌套**：只有最外层的 begin/end 到达日志
//! 2. **错误上报**：事务期间第一个失败通过 `mark_error` 转交给日志
//! 3. **无日志**：没有挂接日志时所有调用都是空操作，写入直接到设备

use crate::{
    block::BlockDevice,
    error::{Error, ErrorKind, Result},
};
use alloc::boxed::Box;

use super::journal::Journal;

/// 事务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// 没有事务
    Idle,

    /// 事务活跃
    Active,

    /// 事务中有操作失败，结束时会报告给日志
    Failed,
}

/// 事务守卫
pub struct TransactionGuard {
    /// 外部日志（可选）
    journal: Option<Box<dyn Journal>>,

    /// 嵌套深度
    depth: u32,

    /// 事务状态
    state: TransactionState,

    /// 事务中第一个错误
    error: Option<Error>,
}

impl TransactionGuard {
    /// 创建无日志的守卫
    pub fn new() -> Self {
        Self {
            journal: None,
            depth: 0,
            state: TransactionState::Idle,
            error: None,
        }
    }

    /// 挂接日志
    ///
    /// 事务进行中不允许替换日志。
    pub fn set_journal(&mut self, journal: Box<dyn Journal>) -> Result<()> {
        if self.depth > 0 {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "Cannot replace journal while a transaction is running",
            ));
        }
        self.journal = Some(journal);
        Ok(())
    }

    /// 是否挂接了日志
    pub fn has_journal(&self) -> bool {
        self.journal.is_some()
    }

    /// 开始事务
    pub fn begin(&mut self) -> Result<()> {
        if self.depth == 0 {
            if let Some(journal) = self.journal.as_mut() {
                journal.begin()?;
                log::trace!("[JOURNAL] transaction opened");
            }
            self.state = TransactionState::Active;
            self.error = None;
        }
        self.depth += 1;
        Ok(())
    }

    /// 记录事务中的失败（只保留第一个）
    pub fn mark_error(&mut self, err: &Error) {
        if self.depth > 0 && self.error.is_none() {
            self.error = Some(err.clone());
            self.state = TransactionState::Failed;
        }
    }

    /// 结束事务
    ///
    /// 最外层 end 时，若有记录的错误先 `mark_error`，再调用日志的 `end`。
    pub fn end(&mut self, dev: &mut dyn BlockDevice) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "Transaction end without begin",
            ));
        }
        self.depth -= 1;
        if self.depth > 0 {
            return Ok(());
        }

        let error = self.error.take();
        self.state = TransactionState::Idle;
        if let Some(journal) = self.journal.as_mut() {
            if let Some(err) = &error {
                log::warn!("[JOURNAL] transaction failed: {}", err);
                journal.mark_error(err);
            }
            journal.end(dev)?;
            log::trace!("[JOURNAL] transaction closed");
        }
        Ok(())
    }

    /// 当前是否有日志事务打开（写入需要经过日志）
    pub fn is_journaling(&self) -> bool {
        self.depth > 0 && self.journal.is_some()
    }

    /// 获取事务状态
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// 获取嵌套深度
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// 获取日志可变引用
    pub fn journal_mut(&mut self) -> Option<&mut (dyn Journal + 'static)> {
        self.journal.as_deref_mut()
    }
}

impl Default for TransactionGuard {
    fn default() -> Self {
        Self::new()
    }
}
