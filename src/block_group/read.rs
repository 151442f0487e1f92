//! 块组描述符读取和查询操作

use crate::{
    block::{BlockDev, BlockDevice},
    consts::*,
    error::{Error, ErrorKind, Result},
    superblock::Superblock,
};
use alloc::vec;
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

/// 判断块组是否带有 superblock（以及 GDT）备份
///
/// 启用 SPARSE_SUPER 时只有 0、1 以及 3、5、7 的幂次块组带备份
pub fn group_has_super(sb: &Superblock, group: u32) -> bool {
    if group <= 1 || !sb.has_ro_compat_feature(EXT4_FEATURE_RO_COMPAT_SPARSE_SUPER) {
        return true;
    }
    if group % 2 == 0 {
        return false;
    }
    [3u32, 5, 7].iter().any(|&base| {
        let mut n = group;
        while n % base == 0 {
            n /= base;
        }
        n == 1
    })
}

/// 计算块组描述符的存储位置
///
/// 返回 (块地址, 块内偏移)。支持两种布局：
/// - 传统模式：所有描述符连续存放在 first_data_block + 1 开始的块中
/// - META_BG 模式：每个 metagroup 的描述符块存放在该 metagroup 第一个块组中
pub fn get_block_group_desc_location(sb: &Superblock, group_num: u32) -> (u64, u64) {
    let block_size = sb.block_size() as u64;
    let desc_size = sb.group_desc_size() as u64;
    let first_data_block = sb.first_data_block() as u64;
    let desc_per_block = block_size / desc_size;

    let metagroup = group_num as u64 / desc_per_block;
    let has_meta_bg = sb.has_incompat_feature(EXT4_FEATURE_INCOMPAT_META_BG);

    if has_meta_bg && metagroup >= sb.first_meta_bg() as u64 {
        let first_group = (metagroup * desc_per_block) as u32;
        let group_start = first_data_block + first_group as u64 * sb.blocks_per_group() as u64;
        let has_super = group_has_super(sb, first_group) as u64;
        let offset = (group_num as u64 % desc_per_block) * desc_size;
        return (group_start + has_super, offset);
    }

    let gdt_block = first_data_block + 1 + (group_num as u64 * desc_size) / block_size;
    let offset = (group_num as u64 * desc_size) % block_size;
    (gdt_block, offset)
}

/// 块组描述符
///
/// 只解析恢复和 inode 定位需要的字段，64 位描述符的高半部分在
/// `desc_size > 32` 时合并。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockGroup {
    group_num: u32,
    block_bitmap: u64,
    inode_bitmap: u64,
    inode_table: u64,
    free_blocks_count: u32,
    free_inodes_count: u32,
    used_dirs_count: u32,
    itable_unused: u32,
    flags: u16,
    checksum: u16,
}

impl BlockGroup {
    /// 从描述符原始字节解析
    pub fn parse(group_num: u32, raw: &[u8], desc_size: usize) -> Result<Self> {
        if raw.len() < desc_size || desc_size < EXT4_GROUP_DESC_SIZE {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Block group descriptor truncated",
            ));
        }

        let lo32 = |o: usize| LittleEndian::read_u32(&raw[o..]) as u64;
        let lo16 = |o: usize| LittleEndian::read_u16(&raw[o..]) as u32;
        let wide = desc_size >= EXT4_GROUP_DESC_SIZE_64;
        let hi32 = |o: usize| if wide { lo32(o) << 32 } else { 0 };
        let hi16 = |o: usize| if wide { lo16(o) << 16 } else { 0 };

        Ok(Self {
            group_num,
            block_bitmap: lo32(0) | hi32(32),
            inode_bitmap: lo32(4) | hi32(36),
            inode_table: lo32(8) | hi32(40),
            free_blocks_count: lo16(12) | hi16(44),
            free_inodes_count: lo16(14) | hi16(46),
            used_dirs_count: lo16(16) | hi16(48),
            flags: LittleEndian::read_u16(&raw[18..]),
            itable_unused: lo16(28) | hi16(50),
            checksum: LittleEndian::read_u16(&raw[30..]),
        })
    }

    /// 从块设备加载块组描述符
    pub fn load<D: BlockDevice>(
        bdev: &mut BlockDev<D>,
        sb: &Superblock,
        group_num: u32,
    ) -> Result<Self> {
        if group_num >= sb.block_group_count() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Block group number out of range",
            ));
        }

        let block_size = sb.block_size() as u64;
        let desc_size = sb.group_desc_size();
        let (gdt_block, offset) = get_block_group_desc_location(sb, group_num);

        let mut desc_buf = vec![0u8; desc_size];
        bdev.read_bytes(gdt_block * block_size + offset, &mut desc_buf)?;

        Self::parse(group_num, &desc_buf, desc_size)
    }

    /// 获取块组编号
    pub fn group_num(&self) -> u32 {
        self.group_num
    }

    /// 获取块位图块号
    pub fn block_bitmap(&self) -> u64 {
        self.block_bitmap
    }

    /// 获取 inode 位图块号
    pub fn inode_bitmap(&self) -> u64 {
        self.inode_bitmap
    }

    /// 获取 inode 表起始块号
    pub fn inode_table_first_block(&self) -> u64 {
        self.inode_table
    }

    /// 获取空闲块数
    pub fn free_blocks_count(&self) -> u32 {
        self.free_blocks_count
    }

    /// 获取空闲 inode 数
    pub fn free_inodes_count(&self) -> u32 {
        self.free_inodes_count
    }

    /// 获取目录数
    pub fn used_dirs_count(&self) -> u32 {
        self.used_dirs_count
    }

    /// 获取未使用 inode 数
    pub fn itable_unused(&self) -> u32 {
        self.itable_unused
    }

    /// 检查块组标志
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.flags & flag) != 0
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }
}

/// 读取全部块组描述符
pub fn load_all<D: BlockDevice>(bdev: &mut BlockDev<D>, sb: &Superblock) -> Result<Vec<BlockGroup>> {
    let count = sb.block_group_count();
    let mut groups = Vec::with_capacity(count as usize);
    for group in 0..count {
        groups.push(BlockGroup::load(bdev, sb, group)?);
    }
    log::debug!("[BLOCK_GROUP] loaded {} descriptors", count);
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;

    fn superblock(blocks: u64, bpg: u32) -> Superblock {
        let mut sb = Superblock::zeroed();
        sb.set_geometry(0, blocks, bpg, 32, 1);
        sb.set_inode_size(128);
        sb
    }

    #[test]
    fn test_traditional_location() {
        let sb = superblock(1 + 3 * 1024, 1024);
        assert_eq!(get_block_group_desc_location(&sb, 0), (2, 0));
        assert_eq!(get_block_group_desc_location(&sb, 2), (2, 64));
        // 1K 块每块 32 个描述符
        assert_eq!(get_block_group_desc_location(&sb, 33), (3, 32));
    }

    #[test]
    fn test_meta_bg_location() {
        let mut sb = superblock(1 + 64 * 128, 128);
        sb.set_incompat_feature(EXT4_FEATURE_INCOMPAT_META_BG);
        sb.set_ro_compat_feature(EXT4_FEATURE_RO_COMPAT_SPARSE_SUPER);
        sb.set_first_meta_bg(1);

        // metagroup 0 在 first_meta_bg 之前，走传统布局
        assert_eq!(get_block_group_desc_location(&sb, 5), (2, 160));
        // metagroup 1 从块组 32 开始，32 不带 superblock 备份
        assert_eq!(get_block_group_desc_location(&sb, 33), (1 + 32 * 128, 32));
    }

    #[test]
    fn test_sparse_super_groups() {
        let mut sb = superblock(1024, 128);
        sb.set_ro_compat_feature(EXT4_FEATURE_RO_COMPAT_SPARSE_SUPER);
        let with_super: Vec<u32> = (0..30).filter(|&g| group_has_super(&sb, g)).collect();
        assert_eq!(with_super, vec![0, 1, 3, 5, 7, 9, 25, 27]);
    }

    #[test]
    fn test_parse_64bit_descriptor() {
        let mut raw = vec![0u8; 64];
        LittleEndian::write_u32(&mut raw[8..], 0x10);
        LittleEndian::write_u32(&mut raw[40..], 0x1);
        LittleEndian::write_u16(&mut raw[14..], 5);

        let bg = BlockGroup::parse(0, &raw, 64).unwrap();
        assert_eq!(bg.inode_table_first_block(), 0x1_0000_0010);
        assert_eq!(bg.free_inodes_count(), 5);

        let narrow = BlockGroup::parse(0, &raw, 32).unwrap();
        assert_eq!(narrow.inode_table_first_block(), 0x10);
    }

    #[test]
    fn test_load_all() {
        let mut bdev = BlockDev::new(MemDevice::new(1024, 64)).unwrap();
        let sb = superblock(64, 8192);
        let mut desc = vec![0u8; 32];
        LittleEndian::write_u32(&mut desc[8..], 5);
        bdev.write_bytes(2 * 1024, &desc).unwrap();

        let groups = load_all(&mut bdev, &sb).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].inode_table_first_block(), 5);
        assert!(BlockGroup::load(&mut bdev, &sb, 1).is_err());
    }
}
