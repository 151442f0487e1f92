//! JBD2 回放引擎

use super::{recovery, JbdFs, RecoveryInfo, ReplayEngine};
use crate::{
    block::{BlockDev, BlockDevice},
    error::Result,
    inode::Inode,
    superblock::Superblock,
};

/// 基于 [`JbdFs`] 的回放引擎
#[derive(Debug, Default)]
pub struct Jbd2Engine {
    last: Option<RecoveryInfo>,
}

impl Jbd2Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一次 load 或 wipe 的统计
    pub fn last_recovery(&self) -> Option<RecoveryInfo> {
        self.last
    }
}

impl<D: BlockDevice> ReplayEngine<D> for Jbd2Engine {
    type Handle = JbdFs;

    fn init(
        &mut self,
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
        inode: &Inode,
    ) -> Result<JbdFs> {
        JbdFs::load(bdev, superblock, inode.clone())
    }

    fn load(
        &mut self,
        handle: &mut JbdFs,
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
    ) -> Result<()> {
        let info = recovery::recover(handle, bdev, superblock)?;
        self.last = Some(info);
        Ok(())
    }

    fn wipe(
        &mut self,
        handle: &mut JbdFs,
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
        writable: bool,
    ) -> Result<()> {
        let info = recovery::wipe(handle, bdev, superblock, writable)?;
        self.last = Some(info);
        Ok(())
    }

    fn destroy(&mut self, handle: JbdFs) {
        if handle.is_dirty() {
            log::warn!("[JOURNAL] dropping journal with unwritten superblock changes");
        }
        drop(handle);
    }
}
