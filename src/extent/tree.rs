//! Extent 树解析和块映射

use crate::{
    block::{BlockDev, BlockDevice},
    consts::{EXT4_EXTENT_MAGIC, EXT4_EXTENT_MAX_DEPTH},
    error::{Error, ErrorKind, Result},
    inode::Inode,
};
use alloc::vec;
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

/// extent 头、extent 和索引项都是 12 字节
const ENTRY_SIZE: usize = 12;

/// 长度超过该值的 extent 为 unwritten
const EXT_INIT_MAX_LEN: u16 = 1 << 15;

/// Extent 节点头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentHeader {
    pub magic: u16,
    pub entries: u16,
    pub max: u16,
    pub depth: u16,
}

impl ExtentHeader {
    /// 解析节点头
    pub fn parse(node: &[u8]) -> Result<Self> {
        if node.len() < ENTRY_SIZE {
            return Err(Error::new(ErrorKind::Corrupted, "Extent node too short"));
        }
        Ok(Self {
            magic: LittleEndian::read_u16(&node[0..]),
            entries: LittleEndian::read_u16(&node[2..]),
            max: LittleEndian::read_u16(&node[4..]),
            depth: LittleEndian::read_u16(&node[6..]),
        })
    }

    /// 魔数和计数字段是否合法
    pub fn is_valid(&self) -> bool {
        self.magic == EXT4_EXTENT_MAGIC
            && self.entries <= self.max
            && self.depth <= EXT4_EXTENT_MAX_DEPTH
    }

    pub fn is_leaf(&self) -> bool {
        self.depth == 0
    }
}

/// 叶子节点中的 extent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// 起始逻辑块
    pub logical_block: u32,
    /// 块数（已去掉 unwritten 标志位）
    pub len: u16,
    /// 起始物理块
    pub physical_block: u64,
    pub unwritten: bool,
}

impl Extent {
    fn parse(raw: &[u8]) -> Self {
        let raw_len = LittleEndian::read_u16(&raw[4..]);
        let (len, unwritten) = if raw_len > EXT_INIT_MAX_LEN {
            (raw_len - EXT_INIT_MAX_LEN, true)
        } else {
            (raw_len, false)
        };
        let start_hi = LittleEndian::read_u16(&raw[6..]) as u64;
        let start_lo = LittleEndian::read_u32(&raw[8..]) as u64;
        Self {
            logical_block: LittleEndian::read_u32(&raw[0..]),
            len,
            physical_block: (start_hi << 32) | start_lo,
            unwritten,
        }
    }

    /// 包含 `logical_block` 时返回对应物理块
    pub fn map(&self, logical_block: u32) -> Option<u64> {
        let offset = logical_block.checked_sub(self.logical_block)?;
        (offset < self.len as u32).then(|| self.physical_block + offset as u64)
    }
}

/// 索引节点中的索引项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExtentIndex {
    logical_block: u32,
    leaf_block: u64,
}

impl ExtentIndex {
    fn parse(raw: &[u8]) -> Self {
        let leaf_lo = LittleEndian::read_u32(&raw[4..]) as u64;
        let leaf_hi = LittleEndian::read_u16(&raw[8..]) as u64;
        Self {
            logical_block: LittleEndian::read_u32(&raw[0..]),
            leaf_block: (leaf_hi << 32) | leaf_lo,
        }
    }
}

/// Extent 树遍历器
///
/// 从 inode 的 `i_block` 根节点开始逐层下降，子节点从块设备读取
pub struct ExtentTree<'a, D: BlockDevice> {
    bdev: &'a mut BlockDev<D>,
    device_total_blocks: u64,
}

impl<'a, D: BlockDevice> ExtentTree<'a, D> {
    /// 创建新的 extent 树遍历器
    pub fn new(bdev: &'a mut BlockDev<D>) -> Self {
        let device_total_blocks = bdev.total_blocks();
        Self {
            bdev,
            device_total_blocks,
        }
    }

    /// 将逻辑块号映射到物理块号
    ///
    /// 找不到覆盖该逻辑块的 extent 时返回 `Ok(None)`
    pub fn map_block(&mut self, inode: &Inode, logical_block: u32) -> Result<Option<u64>> {
        if !inode.has_extents() {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "Inode does not use extents",
            ));
        }

        let mut node: Vec<u8> = inode.block_area().to_vec();
        let mut header = ExtentHeader::parse(&node)?;
        if !header.is_valid() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Invalid extent header in inode",
            ));
        }

        let root_depth = header.depth;
        loop {
            if header.is_leaf() {
                return self.search_leaf_node(&node, &header, logical_block);
            }

            let child = match Self::search_index_node(&node, &header, logical_block)? {
                Some(child) => child,
                None => return Ok(None),
            };

            node = self.read_node(child)?;
            let child_header = ExtentHeader::parse(&node)?;
            // 深度必须逐层递减，否则是环或损坏的树
            if !child_header.is_valid() || child_header.depth + 1 != header.depth {
                log::error!(
                    "[EXTENT] bad child node at block {:#x}, root depth {}",
                    child,
                    root_depth
                );
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    "Invalid extent header in child node",
                ));
            }
            header = child_header;
        }
    }

    /// 在叶子节点中搜索 extent
    fn search_leaf_node(
        &self,
        node: &[u8],
        header: &ExtentHeader,
        logical_block: u32,
    ) -> Result<Option<u64>> {
        for i in 0..header.entries as usize {
            let offset = ENTRY_SIZE + i * ENTRY_SIZE;
            let raw = node.get(offset..offset + ENTRY_SIZE).ok_or(Error::new(
                ErrorKind::Corrupted,
                "Extent node data too short",
            ))?;

            let extent = Extent::parse(raw);
            if let Some(physical) = extent.map(logical_block) {
                if physical >= self.device_total_blocks {
                    log::error!(
                        "[EXTENT] physical block {:#x} beyond device ({} blocks)",
                        physical,
                        self.device_total_blocks
                    );
                    return Err(Error::new(
                        ErrorKind::Corrupted,
                        "Physical block address exceeds device size",
                    ));
                }
                log::trace!("[EXTENT] logical={} -> physical={:#x}", logical_block, physical);
                return Ok(Some(physical));
            }
        }

        Ok(None)
    }

    /// 在索引节点中找到覆盖目标逻辑块的子节点
    ///
    /// 索引按逻辑块号升序，取最后一个起点不大于目标的索引
    fn search_index_node(
        node: &[u8],
        header: &ExtentHeader,
        logical_block: u32,
    ) -> Result<Option<u64>> {
        let mut target = None;
        for i in 0..header.entries as usize {
            let offset = ENTRY_SIZE + i * ENTRY_SIZE;
            let raw = node.get(offset..offset + ENTRY_SIZE).ok_or(Error::new(
                ErrorKind::Corrupted,
                "Extent index node data too short",
            ))?;

            let idx = ExtentIndex::parse(raw);
            if logical_block >= idx.logical_block {
                target = Some(idx.leaf_block);
            } else {
                break;
            }
        }
        Ok(target)
    }

    fn read_node(&mut self, block: u64) -> Result<Vec<u8>> {
        if block >= self.device_total_blocks {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Extent index points beyond device",
            ));
        }
        let mut buf = vec![0u8; self.bdev.block_size() as usize];
        self.bdev.read_block(block, &mut buf)?;
        Ok(buf)
    }
}
