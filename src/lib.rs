//! lwext4_recovery: ext3/ext4 挂载时日志恢复
//!
//! 挂载流程在卷对外可用之前调用一次日志恢复：
//! - 根据 superblock 的 needs_recovery 位和挂载模式决定是否处理日志
//! - 加载内部 journal inode，回放已提交的 JBD2 事务，或丢弃干净的日志
//! - 回放成功后清除 needs_recovery 并把 superblock 刷到磁盘
//!
//! # 示例
//!
//! ```rust,ignore
//! use lwext4_recovery::{MountConfig, Volume};
//!
//! let volume = Volume::mount(MyDevice::new(), MountConfig::default())?;
//! assert!(!volume.lock().superblock().needs_recovery());
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] / [`cache`] - 块设备抽象、写回缓存
//! - [`superblock`] / [`block_group`] / [`inode`] - 磁盘元数据读取
//! - [`extent`] / [`indirect`] - 只读块映射
//! - [`journal`] - JBD2 格式与回放引擎
//! - [`fs`] - 卷与挂载
//! - [`recover`] - 恢复控制器

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 块缓存
pub mod cache;

/// 常量定义
pub mod consts;

/// Superblock 操作
pub mod superblock;

/// 块组描述符
pub mod block_group;

/// Inode 读取
pub mod inode;

/// Extent 树查找
pub mod extent;

/// Indirect blocks 查找（传统 ext2/ext3 间接块寻址）
pub mod indirect;

/// Journal (JBD2)
pub mod journal;

/// 卷与挂载
pub mod fs;

/// 日志恢复控制器
pub mod recover;

/// CRC32C 校验和计算
pub(crate) mod crc;

#[cfg(test)]
pub(crate) mod test_utils;

// ===== 公共导出 =====

pub use error::{Error, ErrorKind, Result};

pub use block::{BlockDev, BlockDevice, DeviceOp, MemDevice};

pub use cache::{BlockCache, CacheBuffer, CacheFlags, CacheStats};

pub use superblock::Superblock;

pub use block_group::BlockGroup;

pub use inode::Inode;

pub use extent::ExtentTree;

pub use indirect::IndirectBlockMapper;

pub use journal::{
    Jbd2Engine, JbdFs, JournalError, RecoveryInfo, ReplayEngine, ScriptedEngine,
    ScriptedOutcome,
};

pub use fs::{MountConfig, RecoveryFailureAction, Volume, VolumeFlags, VolumeState};

pub use recover::{
    check_journal, recover_journal, InodeLoader, JournalCheck, JournalRecovery,
    RecoveryStatus, RefreshPolicy, SkipReason, VolumeInodeLoader,
};
