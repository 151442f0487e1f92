//! JBD 文件系统管理
//!
//! 管理 journal inode 和 journal superblock，提供 journal 块映射与读写。

use super::{checksum, types::*, JournalError};
use crate::{
    block::{BlockDev, BlockDevice},
    error::{Error, Result},
    inode::Inode,
    superblock::Superblock,
};
use alloc::vec;
use alloc::vec::Vec;

/// JBD 文件系统实例
///
/// journal 的第 0 个逻辑块是 journal superblock，日志区从 `first`
/// 开始循环使用到 `maxlen - 1`。
#[derive(Debug)]
pub struct JbdFs {
    /// Journal inode
    inode: Inode,

    /// Journal superblock
    sb: JournalSuperblock,

    /// Whether journal superblock is dirty
    dirty: bool,
}

impl JbdFs {
    /// 读取并验证 journal superblock
    ///
    /// 检查魔数、块类型、块大小是否与文件系统一致、未知的不兼容特性
    /// 以及校验和（启用 CSUM_V2/V3 时）。
    pub fn load<D: BlockDevice>(
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
        inode: Inode,
    ) -> Result<Self> {
        let first_block = inode
            .map_block(bdev, superblock, 0)?
            .ok_or(Error::from(JournalError::NoJournalInode))?;

        let mut buf = vec![0u8; bdev.block_size() as usize];
        bdev.read_block(first_block, &mut buf)?;
        let sb = JournalSuperblock::parse(&buf)?;

        if sb.block_size() != superblock.block_size() {
            log::error!(
                "[JOURNAL] block size {} differs from filesystem block size {}",
                sb.block_size(),
                superblock.block_size()
            );
            return Err(JournalError::BlockSizeMismatch.into());
        }

        let unknown = sb.feature_incompat() & !JBD_KNOWN_INCOMPAT_FEATURES;
        if unknown != 0 {
            log::error!("[JOURNAL] unsupported incompat features {:#x}", unknown);
            return Err(JournalError::UnsupportedFeature(unknown).into());
        }

        if sb.first() == 0 || sb.first() >= sb.max_len() {
            return Err(JournalError::InvalidSuperblock.into());
        }

        let inode_blocks = inode.file_size() / superblock.block_size() as u64;
        if (sb.max_len() as u64) > inode_blocks {
            log::error!(
                "[JOURNAL] maxlen {} exceeds journal inode size ({} blocks)",
                sb.max_len(),
                inode_blocks
            );
            return Err(JournalError::InvalidSuperblock.into());
        }

        if !checksum::verify_sb_checksum(&sb) {
            return Err(JournalError::InvalidSuperblock.into());
        }

        log::debug!(
            "[JOURNAL] loaded ino={} {:?}",
            inode.inode_num(),
            sb
        );

        Ok(Self {
            inode,
            sb,
            dirty: false,
        })
    }

    /// 将 journal 的逻辑块号映射到物理块号
    pub fn inode_bmap<D: BlockDevice>(
        &self,
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
        iblock: u32,
    ) -> Result<u64> {
        if iblock >= self.max_len() {
            return Err(JournalError::MalformedBlock.into());
        }
        self.inode
            .map_block(bdev, superblock, iblock as u64)?
            .ok_or(Error::from(JournalError::MalformedBlock))
    }

    /// 读取 journal 逻辑块
    pub fn read_block<D: BlockDevice>(
        &self,
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
        iblock: u32,
    ) -> Result<Vec<u8>> {
        let pblock = self.inode_bmap(bdev, superblock, iblock)?;
        let mut buf = vec![0u8; bdev.block_size() as usize];
        bdev.read_block(pblock, &mut buf)?;
        Ok(buf)
    }

    /// 写回 journal superblock（如果脏）
    pub fn put<D: BlockDevice>(
        &mut self,
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
    ) -> Result<()> {
        if self.dirty {
            self.write_sb(bdev, superblock)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// 写回 journal superblock
    fn write_sb<D: BlockDevice>(
        &mut self,
        bdev: &mut BlockDev<D>,
        superblock: &Superblock,
    ) -> Result<()> {
        checksum::set_sb_checksum(&mut self.sb);

        let pblock = self.inode_bmap(bdev, superblock, 0)?;
        let mut buf = vec![0u8; bdev.block_size() as usize];
        bdev.read_block(pblock, &mut buf)?;
        buf[..JBD_SUPERBLOCK_SIZE].copy_from_slice(self.sb.as_bytes());
        bdev.write_block(pblock, &buf)?;

        log::debug!(
            "[JOURNAL] superblock written: start={} sequence={}",
            self.start(),
            self.sequence()
        );
        Ok(())
    }

    /// 计算下一个日志块号（越过 maxlen 时回绕到 first）
    pub fn next_block(&self, current: u32) -> u32 {
        let next = current.wrapping_add(1);
        if next >= self.max_len() {
            next - self.max_len() + self.first()
        } else {
            next
        }
    }

    /// 获取 journal inode
    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    /// 获取 journal superblock 引用
    pub fn sb(&self) -> &JournalSuperblock {
        &self.sb
    }

    /// 检查 journal superblock 是否脏
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 获取 journal 块大小
    pub fn block_size(&self) -> u32 {
        self.sb.block_size()
    }

    /// 获取 journal 最大长度（块数）
    pub fn max_len(&self) -> u32 {
        self.sb.max_len()
    }

    /// 获取 journal 第一个日志块号
    pub fn first(&self) -> u32 {
        self.sb.first()
    }

    /// 获取 journal 起始块号，0 表示日志为空
    pub fn start(&self) -> u32 {
        self.sb.start()
    }

    /// 设置 journal 起始块号
    pub fn set_start(&mut self, start: u32) {
        self.sb.set_start(start);
        self.dirty = true;
    }

    /// 获取 journal 序列号
    pub fn sequence(&self) -> u32 {
        self.sb.sequence()
    }

    /// 设置 journal 序列号
    pub fn set_sequence(&mut self, seq: u32) {
        self.sb.set_sequence(seq);
        self.dirty = true;
    }

    /// 检查是否支持某个不兼容特性
    pub fn has_incompat_feature(&self, feature: u32) -> bool {
        self.sb.has_incompat_feature(feature)
    }
}
