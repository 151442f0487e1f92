//! Superblock 读取和验证

use crate::{
    block::{BlockDev, BlockDevice},
    consts::*,
    error::{Error, ErrorKind, Result},
};
use alloc::vec;
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

/// 磁盘格式字段偏移
pub(super) mod off {
    pub const INODES_COUNT: usize = 0;
    pub const BLOCKS_COUNT_LO: usize = 4;
    pub const FREE_BLOCKS_COUNT_LO: usize = 12;
    pub const FREE_INODES_COUNT: usize = 16;
    pub const FIRST_DATA_BLOCK: usize = 20;
    pub const LOG_BLOCK_SIZE: usize = 24;
    pub const BLOCKS_PER_GROUP: usize = 32;
    pub const INODES_PER_GROUP: usize = 40;
    pub const MAGIC: usize = 56;
    pub const STATE: usize = 58;
    pub const REV_LEVEL: usize = 76;
    pub const INODE_SIZE: usize = 88;
    pub const FEATURE_COMPAT: usize = 92;
    pub const FEATURE_INCOMPAT: usize = 96;
    pub const FEATURE_RO_COMPAT: usize = 100;
    pub const UUID: usize = 104;
    pub const JOURNAL_UUID: usize = 208;
    pub const JOURNAL_INUM: usize = 224;
    pub const JOURNAL_DEV: usize = 228;
    pub const DESC_SIZE: usize = 254;
    pub const FIRST_META_BG: usize = 260;
    pub const BLOCKS_COUNT_HI: usize = 336;
    pub const FREE_BLOCKS_COUNT_HI: usize = 344;
    pub const CHECKSUM_TYPE: usize = 373;
}

/// Superblock 包装器
///
/// 保存完整的磁盘镜像，字段按小端序按需解码。
#[derive(Clone, PartialEq, Eq)]
pub struct Superblock {
    pub(super) raw: Vec<u8>,
}

impl core::fmt::Debug for Superblock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Superblock")
            .field("block_size", &self.block_size())
            .field("blocks_count", &self.blocks_count())
            .field("feature_incompat", &format_args!("{:#x}", self.feature_incompat()))
            .field("journal_inum", &self.journal_inum())
            .field("journal_dev", &self.journal_dev())
            .finish()
    }
}

impl Superblock {
    /// 从原始字节创建（不做一致性检查）
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < EXT4_SUPERBLOCK_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Superblock image shorter than 1024 bytes",
            ));
        }
        Ok(Self {
            raw: bytes[..EXT4_SUPERBLOCK_SIZE].to_vec(),
        })
    }

    /// 全零 superblock，仅设置魔数
    pub fn zeroed() -> Self {
        let mut raw = vec![0u8; EXT4_SUPERBLOCK_SIZE];
        LittleEndian::write_u16(&mut raw[off::MAGIC..], EXT4_SUPERBLOCK_MAGIC);
        Self { raw }
    }

    /// 从块设备加载并验证 superblock
    pub fn load<D: BlockDevice>(bdev: &mut BlockDev<D>) -> Result<Self> {
        let mut sb_buf = vec![0u8; EXT4_SUPERBLOCK_SIZE];
        bdev.read_bytes(EXT4_SUPERBLOCK_OFFSET, &mut sb_buf)?;

        let sb = Self { raw: sb_buf };
        sb.check()?;
        Ok(sb)
    }

    /// 原始磁盘镜像
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub(super) fn u16_at(&self, offset: usize) -> u16 {
        LittleEndian::read_u16(&self.raw[offset..])
    }

    pub(super) fn u32_at(&self, offset: usize) -> u32 {
        LittleEndian::read_u32(&self.raw[offset..])
    }

    /// 魔数是否正确
    pub fn is_valid(&self) -> bool {
        self.u16_at(off::MAGIC) == EXT4_SUPERBLOCK_MAGIC
    }

    /// 获取块大小
    pub fn block_size(&self) -> u32 {
        1024u32.checked_shl(self.u32_at(off::LOG_BLOCK_SIZE)).unwrap_or(0)
    }

    /// 获取 inode 大小
    pub fn inode_size(&self) -> u16 {
        if self.u32_at(off::REV_LEVEL) == 0 {
            return EXT4_GOOD_OLD_INODE_SIZE;
        }
        match self.u16_at(off::INODE_SIZE) {
            0 => EXT4_GOOD_OLD_INODE_SIZE,
            size => size,
        }
    }

    /// 获取总块数
    pub fn blocks_count(&self) -> u64 {
        let lo = self.u32_at(off::BLOCKS_COUNT_LO) as u64;
        if self.is_64bit() {
            lo | ((self.u32_at(off::BLOCKS_COUNT_HI) as u64) << 32)
        } else {
            lo
        }
    }

    /// 获取空闲块数
    pub fn free_blocks_count(&self) -> u64 {
        let lo = self.u32_at(off::FREE_BLOCKS_COUNT_LO) as u64;
        if self.is_64bit() {
            lo | ((self.u32_at(off::FREE_BLOCKS_COUNT_HI) as u64) << 32)
        } else {
            lo
        }
    }

    /// 获取总 inode 数
    pub fn inodes_count(&self) -> u32 {
        self.u32_at(off::INODES_COUNT)
    }

    /// 获取空闲 inode 数
    pub fn free_inodes_count(&self) -> u32 {
        self.u32_at(off::FREE_INODES_COUNT)
    }

    /// 获取每组块数
    pub fn blocks_per_group(&self) -> u32 {
        self.u32_at(off::BLOCKS_PER_GROUP)
    }

    /// 获取每组 inode 数
    pub fn inodes_per_group(&self) -> u32 {
        self.u32_at(off::INODES_PER_GROUP)
    }

    /// 获取第一个数据块
    pub fn first_data_block(&self) -> u32 {
        self.u32_at(off::FIRST_DATA_BLOCK)
    }

    /// 获取文件系统状态
    pub fn state(&self) -> u16 {
        self.u16_at(off::STATE)
    }

    /// 计算块组数量
    pub fn block_group_count(&self) -> u32 {
        let blocks_per_group = self.blocks_per_group() as u64;
        if blocks_per_group == 0 {
            return 0;
        }
        let data_blocks = self
            .blocks_count()
            .saturating_sub(self.first_data_block() as u64);
        data_blocks.div_ceil(blocks_per_group) as u32
    }

    /// 兼容特性位图
    pub fn feature_compat(&self) -> u32 {
        self.u32_at(off::FEATURE_COMPAT)
    }

    /// 不兼容特性位图
    pub fn feature_incompat(&self) -> u32 {
        self.u32_at(off::FEATURE_INCOMPAT)
    }

    /// 只读兼容特性位图
    pub fn feature_ro_compat(&self) -> u32 {
        self.u32_at(off::FEATURE_RO_COMPAT)
    }

    /// 检查是否支持某个不兼容特性
    pub fn has_incompat_feature(&self, feature: u32) -> bool {
        (self.feature_incompat() & feature) != 0
    }

    /// 检查是否支持某个只读兼容特性
    pub fn has_ro_compat_feature(&self, feature: u32) -> bool {
        (self.feature_ro_compat() & feature) != 0
    }

    /// 是否设置了"需要恢复"位
    pub fn needs_recovery(&self) -> bool {
        self.has_incompat_feature(EXT4_FEATURE_INCOMPAT_RECOVER)
    }

    /// 检查是否是 64 位文件系统
    pub fn is_64bit(&self) -> bool {
        self.has_incompat_feature(EXT4_FEATURE_INCOMPAT_64BIT)
    }

    /// 检查是否启用元数据校验和
    pub fn has_metadata_csum(&self) -> bool {
        self.has_ro_compat_feature(EXT4_FEATURE_RO_COMPAT_METADATA_CSUM)
    }

    /// 校验和类型
    pub fn checksum_type(&self) -> u8 {
        self.raw[off::CHECKSUM_TYPE]
    }

    /// 日志 inode 编号（0 表示外部日志）
    pub fn journal_inum(&self) -> u32 {
        self.u32_at(off::JOURNAL_INUM)
    }

    /// 日志设备号（非 0 表示外挂日志设备）
    pub fn journal_dev(&self) -> u32 {
        self.u32_at(off::JOURNAL_DEV)
    }

    /// 文件系统 UUID
    pub fn uuid(&self) -> [u8; 16] {
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&self.raw[off::UUID..off::UUID + 16]);
        uuid
    }

    /// 第一个元数据块组（META_BG）
    pub fn first_meta_bg(&self) -> u32 {
        self.u32_at(off::FIRST_META_BG)
    }

    /// 获取块组描述符大小
    pub fn group_desc_size(&self) -> usize {
        if self.is_64bit() {
            match self.u16_at(off::DESC_SIZE) as usize {
                0 => EXT4_GROUP_DESC_SIZE_64,
                size => size,
            }
        } else {
            EXT4_GROUP_DESC_SIZE
        }
    }

    /// 完整的 superblock 验证
    ///
    /// 检查魔数、计数字段、大小字段范围和校验和（如果启用）
    pub fn check(&self) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Invalid ext4 superblock magic number",
            ));
        }

        let block_size = self.block_size();
        if !(EXT4_MIN_BLOCK_SIZE..=EXT4_MAX_BLOCK_SIZE).contains(&block_size) {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Superblock block size out of range",
            ));
        }

        if self.blocks_count() == 0 {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Superblock blocks_count is zero",
            ));
        }

        if self.blocks_per_group() == 0 {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Superblock blocks_per_group is zero",
            ));
        }

        if self.inodes_per_group() == 0 {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Superblock inodes_per_group is zero",
            ));
        }

        let inode_size = self.inode_size();
        if inode_size < EXT4_GOOD_OLD_INODE_SIZE || !inode_size.is_power_of_two() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Superblock inode_size is invalid",
            ));
        }

        let desc_size = self.group_desc_size();
        if !(EXT4_MIN_BLOCK_GROUP_DESCRIPTOR_SIZE..=EXT4_MAX_BLOCK_GROUP_DESCRIPTOR_SIZE)
            .contains(&desc_size)
        {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Block group descriptor size out of range",
            ));
        }

        if !self.verify_checksum() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Superblock checksum verification failed",
            ));
        }

        Ok(())
    }

    /// 验证 superblock 校验和
    pub fn verify_checksum(&self) -> bool {
        super::checksum::verify_checksum(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Superblock {
        let mut sb = Superblock::zeroed();
        sb.set_u32(off::BLOCKS_COUNT_LO, 256);
        sb.set_u32(off::BLOCKS_PER_GROUP, 8192);
        sb.set_u32(off::INODES_PER_GROUP, 32);
        sb.set_u32(off::FIRST_DATA_BLOCK, 1);
        sb.set_u32(off::REV_LEVEL, 1);
        sb.set_u16(off::INODE_SIZE, 128);
        sb
    }

    #[test]
    fn test_accessors() {
        let mut sb = sample();
        sb.set_journal_inum(8);
        sb.set_incompat_feature(EXT4_FEATURE_INCOMPAT_RECOVER);

        assert!(sb.check().is_ok());
        assert_eq!(sb.block_size(), 1024);
        assert_eq!(sb.blocks_count(), 256);
        assert_eq!(sb.block_group_count(), 1);
        assert_eq!(sb.journal_inum(), 8);
        assert_eq!(sb.journal_dev(), 0);
        assert!(sb.needs_recovery());
        assert_eq!(sb.group_desc_size(), EXT4_GROUP_DESC_SIZE);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut sb = sample();
        sb.set_u16(off::MAGIC, 0x1234);
        assert_eq!(sb.check().unwrap_err().kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn test_zero_blocks_per_group_rejected() {
        let mut sb = sample();
        sb.set_u32(off::BLOCKS_PER_GROUP, 0);
        assert!(sb.check().is_err());
        assert_eq!(sb.block_group_count(), 0);
    }

    #[test]
    fn test_short_image_rejected() {
        assert!(Superblock::from_bytes(&[0u8; 100]).is_err());
    }

    #[test]
    fn test_64bit_desc_size_default() {
        let mut sb = sample();
        sb.set_incompat_feature(EXT4_FEATURE_INCOMPAT_64BIT);
        assert_eq!(sb.group_desc_size(), EXT4_GROUP_DESC_SIZE_64);
    }
}
