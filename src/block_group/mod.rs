//! 块组操作模块
//!
//! 这个模块提供 ext4 块组描述符的定位与读取。挂载和日志回放之后，
//! 内存中的描述符表通过 [`load_all`] 整体重建。

mod read;

pub use read::*;
