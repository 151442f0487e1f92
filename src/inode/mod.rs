//! Inode 操作模块
//!
//! 这个模块提供 ext4 inode 的定位、读取以及逻辑块到物理块的映射。
//! 映射根据 inode 标志分派到 extent 树或间接块映射器。

mod read;

pub use read::*;
