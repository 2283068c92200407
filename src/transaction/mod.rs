//! Transaction 系统
//!
//! 目录项和 FAT 表修改被包在事务中，挂接日志时提供掉电一致性。
//!
//! ## 模块结构
//!
//! - `journal` - 外部日志接口（begin / mark_error / end）
//! - `guard` - 嵌套计数和错误上报
//!
//! ## 使用说明
//!
//! ```rust,ignore
//! dev.begin_transaction()?;
//! let result = update_dir_entry(&mut dev, ...);
//! dev.end_transaction(result)?;  // 失败会先 mark_error 再 end
//! ```
//!
//! 没有挂接日志时守卫只维护嵌套深度，写入直接到设备。

mod guard;
mod journal;

pub use guard::{TransactionGuard, TransactionState};
pub use journal::Journal;
