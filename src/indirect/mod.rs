//! 间接块映射模块
//!
//! 不使用 extent 的 inode 通过直接块和一级、二级、三级间接块寻址。

mod mapper;

pub use mapper::IndirectBlockMapper;
