//! Superblock 写入和更新

use super::read::off;
use super::Superblock;
use crate::{
    block::{BlockDev, BlockDevice},
    consts::*,
    error::Result,
};
use byteorder::{ByteOrder, LittleEndian};

impl Superblock {
    pub(crate) fn set_u16(&mut self, offset: usize, value: u16) {
        LittleEndian::write_u16(&mut self.raw[offset..], value);
    }

    pub(crate) fn set_u32(&mut self, offset: usize, value: u32) {
        LittleEndian::write_u32(&mut self.raw[offset..], value);
    }

    /// 设置不兼容特性位
    pub fn set_incompat_feature(&mut self, feature: u32) {
        let v = self.feature_incompat() | feature;
        self.set_u32(off::FEATURE_INCOMPAT, v);
    }

    /// 清除不兼容特性位
    pub fn clear_incompat_feature(&mut self, feature: u32) {
        let v = self.feature_incompat() & !feature;
        self.set_u32(off::FEATURE_INCOMPAT, v);
    }

    /// 设置兼容特性位
    pub fn set_compat_feature(&mut self, feature: u32) {
        let v = self.feature_compat() | feature;
        self.set_u32(off::FEATURE_COMPAT, v);
    }

    /// 设置只读兼容特性位
    pub fn set_ro_compat_feature(&mut self, feature: u32) {
        let v = self.feature_ro_compat() | feature;
        self.set_u32(off::FEATURE_RO_COMPAT, v);
    }

    /// 设置"需要恢复"位
    pub fn set_needs_recovery(&mut self) {
        self.set_incompat_feature(EXT4_FEATURE_INCOMPAT_RECOVER);
    }

    /// 清除"需要恢复"位
    pub fn clear_needs_recovery(&mut self) {
        self.clear_incompat_feature(EXT4_FEATURE_INCOMPAT_RECOVER);
    }

    /// 设置日志 inode 编号
    pub fn set_journal_inum(&mut self, ino: u32) {
        self.set_u32(off::JOURNAL_INUM, ino);
    }

    /// 设置日志设备号
    pub fn set_journal_dev(&mut self, dev: u32) {
        self.set_u32(off::JOURNAL_DEV, dev);
    }

    /// 设置日志 UUID
    pub fn set_journal_uuid(&mut self, uuid: &[u8; 16]) {
        self.raw[off::JOURNAL_UUID..off::JOURNAL_UUID + 16].copy_from_slice(uuid);
    }

    /// 设置校验和类型
    pub fn set_checksum_type(&mut self, csum_type: u8) {
        self.raw[off::CHECKSUM_TYPE] = csum_type;
    }

    /// 设置文件系统几何参数
    pub fn set_geometry(
        &mut self,
        log_block_size: u32,
        blocks_count: u64,
        blocks_per_group: u32,
        inodes_per_group: u32,
        first_data_block: u32,
    ) {
        self.set_u32(off::LOG_BLOCK_SIZE, log_block_size);
        self.set_u32(off::BLOCKS_COUNT_LO, blocks_count as u32);
        self.set_u32(off::BLOCKS_COUNT_HI, (blocks_count >> 32) as u32);
        self.set_u32(off::BLOCKS_PER_GROUP, blocks_per_group);
        self.set_u32(off::INODES_PER_GROUP, inodes_per_group);
        self.set_u32(off::FIRST_DATA_BLOCK, first_data_block);
    }

    /// 设置 inode 大小（同时切换到动态 revision）
    pub fn set_inode_size(&mut self, size: u16) {
        self.set_u32(off::REV_LEVEL, 1);
        self.set_u16(off::INODE_SIZE, size);
    }

    /// 设置 inode 总数
    pub fn set_inodes_count(&mut self, count: u32) {
        self.set_u32(off::INODES_COUNT, count);
    }

    /// 设置块组描述符大小
    pub fn set_desc_size(&mut self, size: u16) {
        self.set_u16(off::DESC_SIZE, size);
    }

    /// 设置第一个元数据块组
    pub fn set_first_meta_bg(&mut self, group: u32) {
        self.set_u32(off::FIRST_META_BG, group);
    }

    /// 重新计算校验和并写回主 superblock
    ///
    /// 数据进入块缓存，调用者需要 `flush` 之后才算持久化
    pub fn write<D: BlockDevice>(&mut self, bdev: &mut BlockDev<D>) -> Result<()> {
        super::checksum::set_checksum(self);
        bdev.write_bytes(EXT4_SUPERBLOCK_OFFSET, &self.raw)?;
        log::debug!(
            "[SUPERBLOCK] written, feature_incompat={:#x}",
            self.feature_incompat()
        );
        Ok(())
    }
}
