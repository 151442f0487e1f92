//! 间接块映射器实现
//!
//! 将文件的逻辑块号映射到物理块号，支持直接块和多级间接块。

use crate::block::{BlockDev, BlockDevice};
use crate::consts::{
    EXT4_INODE_DIRECT_BLOCKS, EXT4_INODE_DOUBLE_INDIRECT_BLOCK, EXT4_INODE_INDIRECT_BLOCK,
    EXT4_INODE_TRIPLE_INDIRECT_BLOCK,
};
use crate::error::{Error, ErrorKind, Result};
use crate::inode::Inode;
use alloc::vec;
use byteorder::{ByteOrder, LittleEndian};

/// 间接块映射器
pub struct IndirectBlockMapper {
    /// 每个间接块可以容纳的指针数量 (block_size / 4)
    blocks_per_indirect: u64,

    /// 每个间接层级的逻辑块上限（不含）
    ///
    /// - limits[0] = 12 (直接块)
    /// - limits[1] = limits[0] + n (一级间接)
    /// - limits[2] = limits[1] + n^2 (二级间接)
    /// - limits[3] = limits[2] + n^3 (三级间接)
    block_limits: [u64; 4],
}

impl IndirectBlockMapper {
    /// 创建新的间接块映射器
    pub fn new(block_size: u32) -> Self {
        let blocks_per_indirect = (block_size / 4) as u64;

        let mut block_limits = [0u64; 4];
        block_limits[0] = EXT4_INODE_DIRECT_BLOCKS as u64;
        let mut per_level = 1u64;
        for i in 1..4 {
            per_level = per_level.saturating_mul(blocks_per_indirect);
            block_limits[i] = block_limits[i - 1].saturating_add(per_level);
        }

        Self {
            blocks_per_indirect,
            block_limits,
        }
    }

    /// 将逻辑块号映射到物理块号
    ///
    /// - `Ok(Some(physical_block))`: 找到了对应的物理块
    /// - `Ok(None)`: 文件空洞
    pub fn map_block<D: BlockDevice>(
        &self,
        blockdev: &mut BlockDev<D>,
        inode: &Inode,
        logical_block: u64,
    ) -> Result<Option<u64>> {
        if logical_block < self.block_limits[0] {
            let physical = inode.block_pointer(logical_block as usize);
            return Ok((physical != 0).then_some(physical as u64));
        }

        let level = self.determine_indirect_level(logical_block)?;
        let root = match level {
            1 => inode.block_pointer(EXT4_INODE_INDIRECT_BLOCK),
            2 => inode.block_pointer(EXT4_INODE_DOUBLE_INDIRECT_BLOCK),
            _ => inode.block_pointer(EXT4_INODE_TRIPLE_INDIRECT_BLOCK),
        };

        let mut offset = logical_block - self.block_limits[level - 1];
        let mut current = root as u64;

        // 自顶向下逐级取指针，每级的跨度为 n^(剩余层数-1)
        for depth in (0..level).rev() {
            if current == 0 {
                return Ok(None);
            }
            let span = self.blocks_per_indirect.pow(depth as u32);
            let index = offset / span;
            offset %= span;
            current = self.read_block_pointer(blockdev, current, index)?;
        }

        Ok((current != 0).then_some(current))
    }

    /// 确定逻辑块号对应的间接层级
    fn determine_indirect_level(&self, logical_block: u64) -> Result<usize> {
        (1..4)
            .find(|&level| logical_block < self.block_limits[level])
            .ok_or(Error::new(
                ErrorKind::InvalidInput,
                "Logical block number exceeds maximum file size",
            ))
    }

    /// 从间接块中读取指定位置的块指针
    fn read_block_pointer<D: BlockDevice>(
        &self,
        blockdev: &mut BlockDev<D>,
        indirect_block: u64,
        index: u64,
    ) -> Result<u64> {
        let mut buf = vec![0u8; blockdev.block_size() as usize];
        blockdev.read_block(indirect_block, &mut buf)?;

        let offset = (index as usize) * 4;
        if offset + 4 > buf.len() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Index out of bounds in indirect block",
            ));
        }

        Ok(LittleEndian::read_u32(&buf[offset..]) as u64)
    }
}
