//! Superblock 操作模块
//!
//! 这个模块提供 ext4 superblock 的读取、验证、写入和特性位更新功能。
//! superblock 以完整的 1024 字节磁盘镜像保存，写回时未识别的字段原样保留。

mod read;
mod write;
pub mod checksum;

pub use read::*;
