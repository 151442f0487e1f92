//! Inode 读取和块映射

use crate::{
    block::{BlockDev, BlockDevice},
    block_group::BlockGroup,
    consts::*,
    error::{Error, ErrorKind, Result},
    extent::ExtentTree,
    indirect::IndirectBlockMapper,
    superblock::Superblock,
};
use alloc::vec;
use byteorder::{ByteOrder, LittleEndian};

/// inode 磁盘格式字段偏移
mod off {
    pub const MODE: usize = 0;
    pub const SIZE_LO: usize = 4;
    pub const DTIME: usize = 20;
    pub const LINKS_COUNT: usize = 26;
    pub const FLAGS: usize = 32;
    pub const BLOCK: usize = 40;
    pub const GENERATION: usize = 100;
    pub const SIZE_HI: usize = 108;
}

/// `i_block` 区域大小（15 个 u32）
pub const EXT4_INODE_BLOCK_BYTES: usize = EXT4_INODE_BLOCKS * 4;

/// 计算 inode 在设备上的字节偏移
pub fn inode_location<D: BlockDevice>(
    bdev: &mut BlockDev<D>,
    sb: &Superblock,
    inode_num: u32,
) -> Result<u64> {
    if inode_num == 0 || inode_num > sb.inodes_count() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "Inode number out of range",
        ));
    }

    let inodes_per_group = sb.inodes_per_group();
    let block_group = (inode_num - 1) / inodes_per_group;
    let index_in_group = (inode_num - 1) % inodes_per_group;

    let desc = BlockGroup::load(bdev, sb, block_group)?;
    let block_size = sb.block_size() as u64;
    let inode_size = sb.inode_size() as u64;

    Ok(desc.inode_table_first_block() * block_size + index_in_group as u64 * inode_size)
}

/// 内存中的 inode
///
/// 只保留读取路径需要的字段，`i_block` 保持原始字节，
/// 由 extent 树或间接块映射器按需解释。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    inode_num: u32,
    mode: u16,
    links_count: u16,
    size: u64,
    dtime: u32,
    flags: u32,
    generation: u32,
    block: [u8; EXT4_INODE_BLOCK_BYTES],
}

impl Inode {
    /// 从原始 inode 字节解析
    pub fn parse(inode_num: u32, raw: &[u8]) -> Result<Self> {
        if raw.len() < EXT4_GOOD_OLD_INODE_SIZE as usize {
            return Err(Error::new(ErrorKind::Corrupted, "Inode record truncated"));
        }

        let mut block = [0u8; EXT4_INODE_BLOCK_BYTES];
        block.copy_from_slice(&raw[off::BLOCK..off::BLOCK + EXT4_INODE_BLOCK_BYTES]);

        let size_lo = LittleEndian::read_u32(&raw[off::SIZE_LO..]) as u64;
        let size_hi = LittleEndian::read_u32(&raw[off::SIZE_HI..]) as u64;

        Ok(Self {
            inode_num,
            mode: LittleEndian::read_u16(&raw[off::MODE..]),
            links_count: LittleEndian::read_u16(&raw[off::LINKS_COUNT..]),
            size: size_lo | (size_hi << 32),
            dtime: LittleEndian::read_u32(&raw[off::DTIME..]),
            flags: LittleEndian::read_u32(&raw[off::FLAGS..]),
            generation: LittleEndian::read_u32(&raw[off::GENERATION..]),
            block,
        })
    }

    /// 从块设备加载 inode
    pub fn load<D: BlockDevice>(
        bdev: &mut BlockDev<D>,
        sb: &Superblock,
        inode_num: u32,
    ) -> Result<Self> {
        let offset = inode_location(bdev, sb, inode_num)?;
        let mut inode_buf = vec![0u8; sb.inode_size() as usize];
        bdev.read_bytes(offset, &mut inode_buf)?;

        let inode = Self::parse(inode_num, &inode_buf)?;
        log::debug!(
            "[INODE] loaded ino={} mode={:#o} size={} flags={:#x}",
            inode_num,
            inode.mode,
            inode.size,
            inode.flags
        );
        Ok(inode)
    }

    /// 获取 inode 编号
    pub fn inode_num(&self) -> u32 {
        self.inode_num
    }

    /// 获取文件模式（类型 + 权限）
    pub fn mode(&self) -> u16 {
        self.mode
    }

    /// 是否是普通文件
    pub fn is_file(&self) -> bool {
        (self.mode & EXT4_INODE_MODE_TYPE_MASK) == EXT4_INODE_MODE_FILE
    }

    /// 获取硬链接数
    pub fn links_count(&self) -> u16 {
        self.links_count
    }

    /// 获取文件大小
    pub fn file_size(&self) -> u64 {
        self.size
    }

    /// 已删除的 inode 的 dtime 非 0
    pub fn is_deleted(&self) -> bool {
        self.dtime != 0
    }

    /// 是否在使用中
    pub fn is_in_use(&self) -> bool {
        self.mode != 0 && self.links_count != 0 && !self.is_deleted()
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// 是否使用 extent 树
    pub fn has_extents(&self) -> bool {
        (self.flags & EXT4_INODE_FLAG_EXTENTS) != 0
    }

    /// 数据是否内联在 inode 中
    pub fn has_inline_data(&self) -> bool {
        (self.flags & EXT4_INODE_FLAG_INLINE_DATA) != 0
    }

    /// `i_block` 原始字节
    pub fn block_area(&self) -> &[u8; EXT4_INODE_BLOCK_BYTES] {
        &self.block
    }

    /// 获取第 `index` 个块指针
    pub fn block_pointer(&self, index: usize) -> u32 {
        if index >= EXT4_INODE_BLOCKS {
            return 0;
        }
        LittleEndian::read_u32(&self.block[index * 4..])
    }

    /// 获取直接块指针
    pub fn get_direct_block(&self, index: usize) -> Option<u32> {
        if index < EXT4_INODE_DIRECT_BLOCKS {
            Some(self.block_pointer(index))
        } else {
            None
        }
    }

    /// 获取一级间接块指针
    pub fn get_indirect_block(&self) -> u32 {
        self.block_pointer(EXT4_INODE_INDIRECT_BLOCK)
    }

    /// 获取二级间接块指针
    pub fn get_double_indirect_block(&self) -> u32 {
        self.block_pointer(EXT4_INODE_DOUBLE_INDIRECT_BLOCK)
    }

    /// 获取三级间接块指针
    pub fn get_triple_indirect_block(&self) -> u32 {
        self.block_pointer(EXT4_INODE_TRIPLE_INDIRECT_BLOCK)
    }

    /// 将逻辑块号映射到物理块号
    ///
    /// 返回 `Ok(None)` 表示空洞
    pub fn map_block<D: BlockDevice>(
        &self,
        bdev: &mut BlockDev<D>,
        sb: &Superblock,
        logical_block: u64,
    ) -> Result<Option<u64>> {
        if self.has_inline_data() {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "Inline data inode has no block mapping",
            ));
        }

        if self.has_extents() {
            let logical_block = u32::try_from(logical_block).map_err(|_| {
                Error::new(ErrorKind::InvalidInput, "Logical block exceeds extent range")
            })?;
            ExtentTree::new(bdev).map_block(self, logical_block)
        } else {
            IndirectBlockMapper::new(sb.block_size()).map_block(bdev, self, logical_block)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_inode(mode: u16, links: u16, flags: u32) -> alloc::vec::Vec<u8> {
        let mut raw = vec![0u8; 128];
        LittleEndian::write_u16(&mut raw[off::MODE..], mode);
        LittleEndian::write_u16(&mut raw[off::LINKS_COUNT..], links);
        LittleEndian::write_u32(&mut raw[off::FLAGS..], flags);
        LittleEndian::write_u32(&mut raw[off::SIZE_LO..], 0x1000);
        LittleEndian::write_u32(&mut raw[off::SIZE_HI..], 1);
        for i in 0..EXT4_INODE_BLOCKS {
            LittleEndian::write_u32(&mut raw[off::BLOCK + i * 4..], 100 + i as u32);
        }
        raw
    }

    #[test]
    fn test_parse_fields() {
        let inode = Inode::parse(8, &raw_inode(0x8180, 1, 0)).unwrap();

        assert_eq!(inode.inode_num(), 8);
        assert!(inode.is_file());
        assert!(inode.is_in_use());
        assert!(!inode.has_extents());
        assert_eq!(inode.file_size(), 0x1_0000_1000);
        assert_eq!(inode.get_direct_block(0), Some(100));
        assert_eq!(inode.get_direct_block(12), None);
        assert_eq!(inode.get_indirect_block(), 112);
        assert_eq!(inode.get_triple_indirect_block(), 114);
    }

    #[test]
    fn test_unused_inode() {
        let inode = Inode::parse(8, &raw_inode(0, 0, 0)).unwrap();
        assert!(!inode.is_in_use());
    }

    #[test]
    fn test_truncated_record() {
        assert!(Inode::parse(8, &[0u8; 64]).is_err());
    }
}
