//! ext4 Journal (JBD2) 恢复
//!
//! 挂载时读取内部日志（journal inode），把已提交但尚未写回的事务
//! 回放到文件系统，或者在日志本来就干净时直接丢弃它。
//!
//! # 结构
//!
//! ```text
//!   recover::JournalRecovery
//!            │  init / load / wipe / destroy
//!            ▼
//!   ┌──────────────────┐      ┌─────────────────┐
//!   │  ReplayEngine    │◄─────┤ ScriptedEngine  │  (测试)
//!   └────────┬─────────┘      └─────────────────┘
//!            │ Jbd2Engine
//!            ▼
//!   ┌──────────────────┐
//!   │     JbdFs        │  journal superblock + inode 块映射
//!   └────────┬─────────┘
//!            │ recovery::{recover, wipe}
//!            ▼
//!      BlockDev / BlockCache
//! ```
//!
//! - [`types`] - JBD2 磁盘格式（大端序）
//! - [`JbdFs`] - journal 实例
//! - [`recover`] / [`wipe`] - 扫描、撤销、回放三遍处理
//! - [`checksum`] - journal superblock 校验和

pub mod checksum;
mod engine;
mod jbd_fs;
mod recovery;
mod scripted;
pub mod types;

pub use engine::Jbd2Engine;
pub use jbd_fs::JbdFs;
pub use recovery::{recover, wipe, RecoveryInfo, RevokeTable};
pub use scripted::{ScriptedEngine, ScriptedHandle, ScriptedOutcome};

use crate::{
    block::{BlockDev, BlockDevice},
    error::Result,
    inode::Inode,
    superblock::Superblock,
};
use core::fmt;

/// Journal 错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalError {
    /// 没有 journal inode，或 journal 第 0 块未映射
    NoJournalInode,
    /// journal superblock 无效
    InvalidSuperblock,
    /// 不支持的不兼容特性
    UnsupportedFeature(u32),
    /// journal 块大小与文件系统不一致
    BlockSizeMismatch,
    /// 日志块格式错误
    MalformedBlock,
    /// 恢复过程中各遍结果不一致
    RecoveryFailed,
    /// I/O 错误
    IoError,
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::NoJournalInode => write!(f, "no journal inode"),
            JournalError::InvalidSuperblock => write!(f, "invalid journal superblock"),
            JournalError::UnsupportedFeature(bits) => {
                write!(f, "unsupported journal features {:#x}", bits)
            }
            JournalError::BlockSizeMismatch => write!(f, "journal block size mismatch"),
            JournalError::MalformedBlock => write!(f, "malformed journal block"),
            JournalError::RecoveryFailed => write!(f, "journal recovery failed"),
            JournalError::IoError => write!(f, "journal I/O error"),
        }
    }
}

/// 日志回放引擎
///
/// 恢复控制器按 `init → (load | wipe) → destroy` 的顺序驱动引擎。
/// `destroy` 消耗句柄，每个句柄只能销毁一次。
pub trait ReplayEngine<D: BlockDevice> {
    /// 回放上下文
    type Handle;

    /// 根据 journal inode 建立回放上下文
    fn init(
        &mut self,
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
        inode: &Inode,
    ) -> Result<Self::Handle>;

    /// 回放已提交的事务并清空日志
    fn load(
        &mut self,
        handle: &mut Self::Handle,
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
    ) -> Result<()>;

    /// 丢弃日志内容；`writable` 为 false 时不得写设备
    fn wipe(
        &mut self,
        handle: &mut Self::Handle,
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
        writable: bool,
    ) -> Result<()>;

    /// 释放回放上下文
    fn destroy(&mut self, handle: Self::Handle);
}
