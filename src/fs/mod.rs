//! 卷与文件 API
//!
//! [`Volume`] 拥有设备、缓存、分配器；[`File`] 是不借用卷的句柄，读写时把卷
//! 传进去。

mod file;
mod types;
mod volume;
mod write;

pub use file::File;
pub use types::{OpenMode, TimeProvider, VolumeConfig, VolumeStats, WriteMode};
pub use volume::Volume;
