//! 内存块设备
//!
//! 写入先进入"易失"视图，只有 `flush()` 之后才进入"持久"视图；
//! `crash()` 丢弃所有未刷新的写入。所有设备操作都会被记录，
//! 便于检查写入与刷新的先后顺序。

use super::BlockDevice;
use crate::consts::EXT4_DEFAULT_SECTOR_SIZE;
use crate::error::{Error, ErrorKind, Result};
use alloc::vec;
use alloc::vec::Vec;

/// 设备操作记录（扇区地址）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOp {
    /// 读扇区
    Read {
        /// 起始扇区
        sector: u64,
        /// 扇区数
        count: u32,
    },
    /// 写扇区
    Write {
        /// 起始扇区
        sector: u64,
        /// 扇区数
        count: u32,
    },
    /// 设备刷新
    Flush,
}

/// 内存块设备
#[derive(Debug, Clone)]
pub struct MemDevice {
    block_size: u32,
    sector_size: u32,
    total_blocks: u64,
    /// 当前可读到的内容（含未刷新的写入）
    volatile: Vec<u8>,
    /// 最近一次 flush 后的内容
    durable: Vec<u8>,
    ops: Vec<DeviceOp>,
    read_only: bool,
    fail_writes: bool,
    fail_flush: bool,
}

impl MemDevice {
    /// 创建全零设备
    pub fn new(block_size: u32, total_blocks: u64) -> Self {
        let len = block_size as usize * total_blocks as usize;
        Self {
            block_size,
            sector_size: EXT4_DEFAULT_SECTOR_SIZE,
            total_blocks,
            volatile: vec![0u8; len],
            durable: vec![0u8; len],
            ops: Vec::new(),
            read_only: false,
            fail_writes: false,
            fail_flush: false,
        }
    }

    /// 标记为只读设备
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// 直接写入镜像内容（同时进入两个视图，不记录操作）
    pub fn poke(&mut self, offset: usize, bytes: &[u8]) {
        self.volatile[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.durable[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// 当前视图中的一个块
    pub fn block(&self, lba: u64) -> &[u8] {
        let bs = self.block_size as usize;
        let start = lba as usize * bs;
        &self.volatile[start..start + bs]
    }

    /// 持久视图中的一个块
    pub fn durable_block(&self, lba: u64) -> &[u8] {
        let bs = self.block_size as usize;
        let start = lba as usize * bs;
        &self.durable[start..start + bs]
    }

    /// 持久视图中的任意字节区间
    pub fn durable_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.durable[offset..offset + len]
    }

    /// 模拟掉电：丢弃所有未刷新的写入
    pub fn crash(&mut self) {
        self.volatile.copy_from_slice(&self.durable);
    }

    /// 操作记录
    pub fn ops(&self) -> &[DeviceOp] {
        &self.ops
    }

    /// 清空操作记录
    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// 写操作次数
    pub fn write_ops(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DeviceOp::Write { .. }))
            .count()
    }

    /// 之后的写入全部失败
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// 之后的 flush 全部失败
    pub fn set_fail_flush(&mut self, fail: bool) {
        self.fail_flush = fail;
    }

    fn range(&self, sector: u64, count: u32) -> Result<core::ops::Range<usize>> {
        let start = sector as usize * self.sector_size as usize;
        let end = start + count as usize * self.sector_size as usize;
        if end > self.volatile.len() {
            return Err(Error::new(ErrorKind::Io, "access beyond end of memory device"));
        }
        Ok(start..end)
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
        let range = self.range(lba, count)?;
        let len = range.len();
        buf[..len].copy_from_slice(&self.volatile[range]);
        self.ops.push(DeviceOp::Read { sector: lba, count });
        Ok(len)
    }

    fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
        if self.read_only {
            return Err(Error::new(ErrorKind::ReadOnly, "memory device is read-only"));
        }
        if self.fail_writes {
            return Err(Error::new(ErrorKind::Io, "injected write failure"));
        }
        let range = self.range(lba, count)?;
        let len = range.len();
        self.volatile[range].copy_from_slice(&buf[..len]);
        self.ops.push(DeviceOp::Write { sector: lba, count });
        Ok(len)
    }

    fn flush(&mut self) -> Result<()> {
        if self.fail_flush {
            return Err(Error::new(ErrorKind::Io, "injected flush failure"));
        }
        self.durable.copy_from_slice(&self.volatile);
        self.ops.push(DeviceOp::Flush);
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
