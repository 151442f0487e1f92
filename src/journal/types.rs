//! JBD2 (Journal Block Device version 2) 磁盘格式定义
//!
//! # 重要说明
//!
//! - **所有字段都是大端序（big-endian）**，统一经 `byteorder::BigEndian` 解码
//! - journal superblock 以完整的块镜像保存，写回时未识别的字段保持不变

use super::JournalError;
use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};

/// UUID 大小（128位）
pub const UUID_SIZE: usize = 16;

// =============================================================================
// Block Header and Types
// =============================================================================

/// JBD2 magic number
pub const JBD_MAGIC_NUMBER: u32 = 0xC03B3998;

/// Block types
pub const JBD_DESCRIPTOR_BLOCK: u32 = 1;
pub const JBD_COMMIT_BLOCK: u32 = 2;
pub const JBD_SUPERBLOCK_V1: u32 = 3;
pub const JBD_SUPERBLOCK_V2: u32 = 4;
pub const JBD_REVOKE_BLOCK: u32 = 5;

/// 块头大小
pub const JBD_HEADER_SIZE: usize = 12;

/// JBD2 块头（所有日志元数据块的标准头部）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    pub magic: u32,
    pub blocktype: u32,
    pub sequence: u32,
}

impl JournalHeader {
    pub fn new(blocktype: u32, sequence: u32) -> Self {
        Self {
            magic: JBD_MAGIC_NUMBER,
            blocktype,
            sequence,
        }
    }

    /// 从块开头解析
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < JBD_HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: BigEndian::read_u32(&data[0..]),
            blocktype: BigEndian::read_u32(&data[4..]),
            sequence: BigEndian::read_u32(&data[8..]),
        })
    }

    /// 写入块开头
    pub fn write(&self, data: &mut [u8]) {
        BigEndian::write_u32(&mut data[0..], self.magic);
        BigEndian::write_u32(&mut data[4..], self.blocktype);
        BigEndian::write_u32(&mut data[8..], self.sequence);
    }

    /// 验证 magic number
    pub fn verify_magic(&self) -> bool {
        self.magic == JBD_MAGIC_NUMBER
    }
}

// =============================================================================
// Feature Flags
// =============================================================================

/// Feature: Checksum v1
pub const JBD_FEATURE_COMPAT_CHECKSUM: u32 = 0x00000001;

/// Feature: Revoke support
pub const JBD_FEATURE_INCOMPAT_REVOKE: u32 = 0x00000001;
/// Feature: 64-bit block numbers
pub const JBD_FEATURE_INCOMPAT_64BIT: u32 = 0x00000002;
/// Feature: Async commit
pub const JBD_FEATURE_INCOMPAT_ASYNC_COMMIT: u32 = 0x00000004;
/// Feature: Checksum v2 (crc32c)
pub const JBD_FEATURE_INCOMPAT_CSUM_V2: u32 = 0x00000008;
/// Feature: Checksum v3 (full 32-bit checksum in tags)
pub const JBD_FEATURE_INCOMPAT_CSUM_V3: u32 = 0x00000010;

/// Known incompatible features
pub const JBD_KNOWN_INCOMPAT_FEATURES: u32 = JBD_FEATURE_INCOMPAT_REVOKE
    | JBD_FEATURE_INCOMPAT_ASYNC_COMMIT
    | JBD_FEATURE_INCOMPAT_64BIT
    | JBD_FEATURE_INCOMPAT_CSUM_V2
    | JBD_FEATURE_INCOMPAT_CSUM_V3;

/// Checksum type: CRC32C
pub const JBD_CRC32C_CHKSUM: u8 = 4;

// =============================================================================
// Block Tags (Descriptor Block)
// =============================================================================

// Tag flags
/// On-disk block is escaped (starts with JBD magic)
pub const JBD_FLAG_ESCAPE: u32 = 1;
/// Block has same UUID as previous
pub const JBD_FLAG_SAME_UUID: u32 = 2;
/// Block deleted by this transaction
pub const JBD_FLAG_DELETED: u32 = 4;
/// Last tag in this descriptor block
pub const JBD_FLAG_LAST_TAG: u32 = 8;

/// descriptor / revoke 块尾部校验和大小
pub const JBD_TAIL_SIZE: usize = 4;

/// descriptor 块中的一个 tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTag {
    /// 目标文件系统块号
    pub blocknr: u64,
    pub flags: u32,
}

impl BlockTag {
    pub fn is_escaped(&self) -> bool {
        self.flags & JBD_FLAG_ESCAPE != 0
    }

    pub fn is_last(&self) -> bool {
        self.flags & JBD_FLAG_LAST_TAG != 0
    }

    /// 后面是否跟着 16 字节 UUID
    pub fn has_uuid(&self) -> bool {
        self.flags & JBD_FLAG_SAME_UUID == 0
    }
}

// =============================================================================
// Journal Superblock
// =============================================================================

/// Journal superblock 字段偏移
///
/// ```text
/// Offset  Size  Field
/// 0x0000  12    header
/// 0x000C  4     blocksize
/// 0x0010  4     maxlen
/// 0x0014  4     first
/// 0x0018  4     sequence
/// 0x001C  4     start
/// 0x0020  4     errno
/// 0x0024  4     feature_compat
/// 0x0028  4     feature_incompat
/// 0x002C  4     feature_ro_compat
/// 0x0030  16    uuid
/// 0x0050  1     checksum_type
/// 0x00FC  4     checksum
/// ```
mod off {
    pub const BLOCKSIZE: usize = 0x0C;
    pub const MAXLEN: usize = 0x10;
    pub const FIRST: usize = 0x14;
    pub const SEQUENCE: usize = 0x18;
    pub const START: usize = 0x1C;
    pub const ERRNO: usize = 0x20;
    pub const FEATURE_COMPAT: usize = 0x24;
    pub const FEATURE_INCOMPAT: usize = 0x28;
    pub const FEATURE_RO_COMPAT: usize = 0x2C;
    pub const UUID: usize = 0x30;
    pub const CHECKSUM_TYPE: usize = 0x50;
    pub const CHECKSUM: usize = 0xFC;
}

/// Superblock size
pub const JBD_SUPERBLOCK_SIZE: usize = 1024;

/// 偏移 `JBD_SB_CHECKSUM_OFFSET` 处是校验和字段
pub const JBD_SB_CHECKSUM_OFFSET: usize = off::CHECKSUM;

/// Journal 超级块
#[derive(Clone, PartialEq, Eq)]
pub struct JournalSuperblock {
    raw: Vec<u8>,
}

impl core::fmt::Debug for JournalSuperblock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JournalSuperblock")
            .field("blocktype", &self.header().blocktype)
            .field("blocksize", &self.block_size())
            .field("maxlen", &self.max_len())
            .field("first", &self.first())
            .field("sequence", &self.sequence())
            .field("start", &self.start())
            .finish()
    }
}

impl JournalSuperblock {
    /// 从块数据解析并做格式检查
    pub fn parse(data: &[u8]) -> core::result::Result<Self, JournalError> {
        if data.len() < JBD_SUPERBLOCK_SIZE {
            return Err(JournalError::InvalidSuperblock);
        }
        let sb = Self {
            raw: data[..JBD_SUPERBLOCK_SIZE].to_vec(),
        };

        let header = sb.header();
        if !header.verify_magic() {
            return Err(JournalError::InvalidSuperblock);
        }
        if header.blocktype != JBD_SUPERBLOCK_V1 && header.blocktype != JBD_SUPERBLOCK_V2 {
            return Err(JournalError::InvalidSuperblock);
        }
        Ok(sb)
    }

    #[cfg(test)]
    pub(crate) fn from_raw_unchecked(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    /// 原始字节
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn read(&self, offset: usize) -> u32 {
        BigEndian::read_u32(&self.raw[offset..])
    }

    fn write(&mut self, offset: usize, value: u32) {
        BigEndian::write_u32(&mut self.raw[offset..], value);
    }

    pub fn header(&self) -> JournalHeader {
        JournalHeader {
            magic: self.read(0),
            blocktype: self.read(4),
            sequence: self.read(8),
        }
    }

    fn is_v2(&self) -> bool {
        self.header().blocktype == JBD_SUPERBLOCK_V2
    }

    /// 获取 journal 块大小
    pub fn block_size(&self) -> u32 {
        self.read(off::BLOCKSIZE)
    }

    /// 获取 journal 总块数
    pub fn max_len(&self) -> u32 {
        self.read(off::MAXLEN)
    }

    /// 第一个日志块
    pub fn first(&self) -> u32 {
        self.read(off::FIRST)
    }

    /// 日志中期望的第一个事务 ID
    pub fn sequence(&self) -> u32 {
        self.read(off::SEQUENCE)
    }

    pub fn set_sequence(&mut self, seq: u32) {
        self.write(off::SEQUENCE, seq);
    }

    /// 日志起始块，0 表示日志为空
    pub fn start(&self) -> u32 {
        self.read(off::START)
    }

    pub fn set_start(&mut self, start: u32) {
        self.write(off::START, start);
    }

    /// journal_abort 记录的错误值
    pub fn errno(&self) -> i32 {
        self.read(off::ERRNO) as i32
    }

    pub fn feature_compat(&self) -> u32 {
        if self.is_v2() { self.read(off::FEATURE_COMPAT) } else { 0 }
    }

    pub fn feature_incompat(&self) -> u32 {
        if self.is_v2() { self.read(off::FEATURE_INCOMPAT) } else { 0 }
    }

    pub fn feature_ro_compat(&self) -> u32 {
        if self.is_v2() { self.read(off::FEATURE_RO_COMPAT) } else { 0 }
    }

    /// Check if journal has a specific incompatible feature
    pub fn has_incompat_feature(&self, feature: u32) -> bool {
        (self.feature_incompat() & feature) != 0
    }

    pub fn uuid(&self) -> [u8; UUID_SIZE] {
        let mut uuid = [0u8; UUID_SIZE];
        uuid.copy_from_slice(&self.raw[off::UUID..off::UUID + UUID_SIZE]);
        uuid
    }

    pub fn checksum_type(&self) -> u8 {
        self.raw[off::CHECKSUM_TYPE]
    }

    pub fn checksum(&self) -> u32 {
        self.read(off::CHECKSUM)
    }

    pub(super) fn set_checksum_field(&mut self, csum: u32) {
        self.write(off::CHECKSUM, csum);
    }

    /// Check if journal supports 64-bit block numbers
    pub fn is_64bit(&self) -> bool {
        self.has_incompat_feature(JBD_FEATURE_INCOMPAT_64BIT)
    }

    /// 是否启用 v2 或 v3 校验和
    pub fn has_csum_v2or3(&self) -> bool {
        self.has_incompat_feature(JBD_FEATURE_INCOMPAT_CSUM_V2 | JBD_FEATURE_INCOMPAT_CSUM_V3)
    }

    /// 一个 descriptor tag 占用的字节数（不含可选 UUID）
    pub fn tag_bytes(&self) -> usize {
        if self.has_incompat_feature(JBD_FEATURE_INCOMPAT_CSUM_V3) {
            return 16;
        }
        let mut size = 12;
        if self.has_incompat_feature(JBD_FEATURE_INCOMPAT_CSUM_V2) {
            size += 2;
        }
        if self.is_64bit() {
            size
        } else {
            size - 4
        }
    }

    /// revoke 记录大小
    pub fn revoke_record_bytes(&self) -> usize {
        if self.is_64bit() {
            8
        } else {
            4
        }
    }

    /// 解析 descriptor 块中偏移 `offset` 处的 tag
    pub fn parse_tag(&self, data: &[u8], offset: usize) -> BlockTag {
        let lo = BigEndian::read_u32(&data[offset..]) as u64;
        let (flags, hi) = if self.has_incompat_feature(JBD_FEATURE_INCOMPAT_CSUM_V3) {
            let hi = BigEndian::read_u32(&data[offset + 8..]) as u64;
            (BigEndian::read_u32(&data[offset + 4..]), hi)
        } else {
            let flags = BigEndian::read_u16(&data[offset + 6..]) as u32;
            let hi = if self.is_64bit() {
                BigEndian::read_u32(&data[offset + 8..]) as u64
            } else {
                0
            };
            (flags, hi)
        };
        let blocknr = if self.is_64bit() { lo | (hi << 32) } else { lo };
        BlockTag { blocknr, flags }
    }
}
