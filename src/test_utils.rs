//! 测试用磁盘镜像构造器
//!
//! 生成一个 1K 块、单块组的 ext4 镜像：
//!
//! ```text
//! 块 1      superblock
//! 块 2      块组描述符表
//! 块 3/4    块位图 / inode 位图
//! 块 5..9   inode 表（32 个 128 字节 inode）
//! 块 20..52 journal（32 块，extent 或直接/间接映射）
//! 块 60     journal 的一级间接块（间接映射时）
//! 块 100+   测试用的"家"块
//! ```

use crate::block::{BlockDev, MemDevice};
use crate::consts::*;
use crate::journal::types::*;
use crate::superblock::Superblock;
use alloc::vec;
use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

const BLOCK_SIZE: usize = 1024;
const TOTAL_BLOCKS: u64 = 256;
const INODE_TABLE: u64 = 5;
const INODES_PER_GROUP: u32 = 32;
const INODE_SIZE: usize = 128;
const INDIRECT_BLOCK: u64 = 60;
const JOURNAL_UUID: [u8; 16] = *b"journal-uuid-xyz";

/// 一个待写入日志的事务
#[derive(Debug, Clone)]
pub struct Txn {
    seq: u32,
    blocks: Vec<(u64, Vec<u8>)>,
    revokes: Vec<u64>,
    committed: bool,
}

impl Txn {
    pub fn new(seq: u32) -> Self {
        Self {
            seq,
            blocks: Vec::new(),
            revokes: Vec::new(),
            committed: true,
        }
    }

    /// 记录一个整块填充为 `fill` 的块
    pub fn block(self, home: u64, fill: u8) -> Self {
        self.raw_block(home, vec![fill; BLOCK_SIZE])
    }

    /// 记录任意内容的块；以 JBD 魔数开头的块会被转义
    pub fn raw_block(mut self, home: u64, data: Vec<u8>) -> Self {
        self.blocks.push((home, data));
        self
    }

    /// 撤销一个块
    pub fn revoke(mut self, home: u64) -> Self {
        self.revokes.push(home);
        self
    }

    /// 不写提交块
    pub fn uncommitted(mut self) -> Self {
        self.committed = false;
        self
    }
}

/// 镜像构造器
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    needs_recovery: bool,
    journal_ino: u32,
    journal_dev: u32,
    indirect_journal: bool,
    corrupt_magic: bool,
    journal_incompat: u32,
    metadata_csum: bool,
    log_start: u32,
    journal_sequence: u32,
    txns: Vec<Txn>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    /// journal 逻辑块数
    pub const JOURNAL_LEN: u32 = 32;
    /// journal 第一个物理块
    pub const JOURNAL_PHYS: u64 = 20;

    pub fn new() -> Self {
        Self {
            needs_recovery: false,
            journal_ino: EXT4_JOURNAL_INO,
            journal_dev: 0,
            indirect_journal: false,
            corrupt_magic: false,
            journal_incompat: JBD_FEATURE_INCOMPAT_REVOKE,
            metadata_csum: false,
            log_start: 1,
            journal_sequence: 1,
            txns: Vec::new(),
        }
    }

    pub fn needs_recovery(mut self, set: bool) -> Self {
        self.needs_recovery = set;
        self
    }

    /// 0 表示外部日志（不写 inode）
    pub fn journal_ino(mut self, ino: u32) -> Self {
        self.journal_ino = ino;
        self
    }

    pub fn journal_dev(mut self, dev: u32) -> Self {
        self.journal_dev = dev;
        self
    }

    /// journal inode 使用直接/间接块映射
    pub fn indirect_journal(mut self) -> Self {
        self.indirect_journal = true;
        self
    }

    pub fn corrupt_journal_magic(mut self) -> Self {
        self.corrupt_magic = true;
        self
    }

    pub fn journal_incompat(mut self, features: u32) -> Self {
        self.journal_incompat |= features;
        self
    }

    pub fn metadata_csum(mut self) -> Self {
        self.metadata_csum = true;
        self
    }

    /// 日志从哪个逻辑块开始写
    pub fn log_start(mut self, block: u32) -> Self {
        self.log_start = block;
        self
    }

    /// 日志为空时 journal superblock 中的序列号
    pub fn journal_sequence(mut self, seq: u32) -> Self {
        self.journal_sequence = seq;
        self
    }

    pub fn txn(mut self, txn: Txn) -> Self {
        self.txns.push(txn);
        self
    }

    /// 构造内存设备
    pub fn build(&self) -> MemDevice {
        let mut dev = MemDevice::new(BLOCK_SIZE as u32, TOTAL_BLOCKS);

        dev.poke(EXT4_SUPERBLOCK_OFFSET as usize, self.superblock().as_bytes());

        let mut desc = [0u8; EXT4_GROUP_DESC_SIZE];
        LittleEndian::write_u32(&mut desc[0..], 3);
        LittleEndian::write_u32(&mut desc[4..], 4);
        LittleEndian::write_u32(&mut desc[8..], INODE_TABLE as u32);
        LittleEndian::write_u16(&mut desc[14..], (INODES_PER_GROUP - 12) as u16);
        dev.poke(2 * BLOCK_SIZE, &desc);

        if self.journal_ino != 0 {
            let offset = INODE_TABLE as usize * BLOCK_SIZE
                + (self.journal_ino as usize - 1) * INODE_SIZE;
            dev.poke(offset, &self.journal_inode());
            if self.indirect_journal {
                let mut ind = vec![0u8; BLOCK_SIZE];
                for l in EXT4_INODE_DIRECT_BLOCKS..Self::JOURNAL_LEN as usize {
                    let slot = (l - EXT4_INODE_DIRECT_BLOCKS) * 4;
                    LittleEndian::write_u32(&mut ind[slot..], (Self::JOURNAL_PHYS as usize + l) as u32);
                }
                dev.poke(INDIRECT_BLOCK as usize * BLOCK_SIZE, &ind);
            }
        }

        self.write_journal(&mut dev);
        dev
    }

    /// 构造块设备并加载 superblock（无缓存）
    pub fn build_volume(&self) -> (BlockDev<MemDevice>, Superblock) {
        let mut bdev = BlockDev::new(self.build()).unwrap();
        let sb = Superblock::load(&mut bdev).unwrap();
        (bdev, sb)
    }

    fn superblock(&self) -> Superblock {
        let mut sb = Superblock::zeroed();
        sb.set_geometry(0, TOTAL_BLOCKS, 8192, INODES_PER_GROUP, 1);
        sb.set_inodes_count(INODES_PER_GROUP);
        sb.set_inode_size(INODE_SIZE as u16);
        sb.set_compat_feature(EXT4_FEATURE_COMPAT_HAS_JOURNAL);
        sb.set_incompat_feature(EXT4_FEATURE_INCOMPAT_EXTENTS);
        if self.needs_recovery {
            sb.set_needs_recovery();
        }
        sb.set_journal_inum(self.journal_ino);
        sb.set_journal_dev(self.journal_dev);
        sb.set_journal_uuid(&JOURNAL_UUID);
        if self.metadata_csum {
            sb.set_ro_compat_feature(EXT4_FEATURE_RO_COMPAT_METADATA_CSUM);
            sb.set_checksum_type(EXT4_CHECKSUM_CRC32C);
        }
        crate::superblock::checksum::set_checksum(&mut sb);
        sb
    }

    fn journal_inode(&self) -> Vec<u8> {
        let mut raw = vec![0u8; INODE_SIZE];
        LittleEndian::write_u16(&mut raw[0..], EXT4_INODE_MODE_FILE | 0o600);
        LittleEndian::write_u16(&mut raw[26..], 1);
        LittleEndian::write_u32(&mut raw[4..], Self::JOURNAL_LEN * BLOCK_SIZE as u32);

        if !self.indirect_journal {
            LittleEndian::write_u32(&mut raw[32..], EXT4_INODE_FLAG_EXTENTS);
        }

        let iblock = &mut raw[40..100];
        if self.indirect_journal {
            for l in 0..EXT4_INODE_DIRECT_BLOCKS {
                LittleEndian::write_u32(&mut iblock[l * 4..], (Self::JOURNAL_PHYS as usize + l) as u32);
            }
            LittleEndian::write_u32(&mut iblock[EXT4_INODE_INDIRECT_BLOCK * 4..], INDIRECT_BLOCK as u32);
        } else {
            LittleEndian::write_u16(&mut iblock[0..], EXT4_EXTENT_MAGIC);
            LittleEndian::write_u16(&mut iblock[2..], 1);
            LittleEndian::write_u16(&mut iblock[4..], 4);
            LittleEndian::write_u32(&mut iblock[12..], 0);
            LittleEndian::write_u16(&mut iblock[16..], Self::JOURNAL_LEN as u16);
            LittleEndian::write_u32(&mut iblock[20..], Self::JOURNAL_PHYS as u32);
        }
        raw
    }

    fn journal_superblock(&self) -> JournalSuperblock {
        let mut raw = vec![0u8; JBD_SUPERBLOCK_SIZE];
        JournalHeader::new(JBD_SUPERBLOCK_V2, 0).write(&mut raw);
        BigEndian::write_u32(&mut raw[0x0C..], BLOCK_SIZE as u32);
        BigEndian::write_u32(&mut raw[0x10..], Self::JOURNAL_LEN);
        BigEndian::write_u32(&mut raw[0x14..], 1);
        let (sequence, start) = match self.txns.first() {
            Some(txn) => (txn.seq, self.log_start),
            None => (self.journal_sequence, 0),
        };
        BigEndian::write_u32(&mut raw[0x18..], sequence);
        BigEndian::write_u32(&mut raw[0x1C..], start);
        BigEndian::write_u32(&mut raw[0x28..], self.journal_incompat);
        raw[0x30..0x40].copy_from_slice(&JOURNAL_UUID);
        if self.journal_incompat & (JBD_FEATURE_INCOMPAT_CSUM_V2 | JBD_FEATURE_INCOMPAT_CSUM_V3) != 0 {
            raw[0x50] = JBD_CRC32C_CHKSUM;
        }
        if self.corrupt_magic {
            raw[0] ^= 0xFF;
        }
        raw[0x100..0x110].copy_from_slice(&JOURNAL_UUID);

        // 损坏魔数时 parse 会失败，直接按原始字节写入
        match JournalSuperblock::parse(&raw) {
            Ok(mut jsb) => {
                crate::journal::checksum::set_sb_checksum(&mut jsb);
                jsb
            }
            Err(_) => JournalSuperblock::from_raw_unchecked(raw),
        }
    }

    fn write_journal(&self, dev: &mut MemDevice) {
        if self.journal_ino == 0 {
            return;
        }
        let jsb = self.journal_superblock();
        let journal_block = |l: u32| (Self::JOURNAL_PHYS + l as u64) as usize * BLOCK_SIZE;
        dev.poke(journal_block(0), jsb.as_bytes());

        let next = |l: u32| if l + 1 >= Self::JOURNAL_LEN { 1 } else { l + 1 };
        let tag_bytes = jsb.tag_bytes();
        let csum_v3 = jsb.has_incompat_feature(JBD_FEATURE_INCOMPAT_CSUM_V3);
        let is_64bit = jsb.is_64bit();
        let mut cursor = self.log_start;

        for txn in &self.txns {
            if !txn.revokes.is_empty() {
                let rec = jsb.revoke_record_bytes();
                let mut block = vec![0u8; BLOCK_SIZE];
                JournalHeader::new(JBD_REVOKE_BLOCK, txn.seq).write(&mut block);
                let mut offset = 16;
                for &home in &txn.revokes {
                    if rec == 8 {
                        BigEndian::write_u64(&mut block[offset..], home);
                    } else {
                        BigEndian::write_u32(&mut block[offset..], home as u32);
                    }
                    offset += rec;
                }
                BigEndian::write_u32(&mut block[12..], offset as u32);
                dev.poke(journal_block(cursor), &block);
                cursor = next(cursor);
            }

            if !txn.blocks.is_empty() {
                let mut desc = vec![0u8; BLOCK_SIZE];
                JournalHeader::new(JBD_DESCRIPTOR_BLOCK, txn.seq).write(&mut desc);
                let mut offset = JBD_HEADER_SIZE;
                let desc_at = cursor;
                cursor = next(cursor);

                for (i, (home, data)) in txn.blocks.iter().enumerate() {
                    let mut flags = if i == 0 { 0 } else { JBD_FLAG_SAME_UUID };
                    if i + 1 == txn.blocks.len() {
                        flags |= JBD_FLAG_LAST_TAG;
                    }
                    let mut payload = data.clone();
                    if BigEndian::read_u32(&payload[0..]) == JBD_MAGIC_NUMBER {
                        flags |= JBD_FLAG_ESCAPE;
                        payload[0..4].fill(0);
                    }

                    BigEndian::write_u32(&mut desc[offset..], *home as u32);
                    if csum_v3 {
                        BigEndian::write_u32(&mut desc[offset + 4..], flags);
                    } else {
                        BigEndian::write_u16(&mut desc[offset + 6..], flags as u16);
                    }
                    if is_64bit {
                        BigEndian::write_u32(&mut desc[offset + 8..], (*home >> 32) as u32);
                    }
                    offset += tag_bytes;
                    if i == 0 {
                        desc[offset..offset + UUID_SIZE].copy_from_slice(&JOURNAL_UUID);
                        offset += UUID_SIZE;
                    }

                    dev.poke(journal_block(cursor), &payload);
                    cursor = next(cursor);
                }
                dev.poke(journal_block(desc_at), &desc);
            }

            if txn.committed {
                let mut commit = vec![0u8; BLOCK_SIZE];
                JournalHeader::new(JBD_COMMIT_BLOCK, txn.seq).write(&mut commit);
                dev.poke(journal_block(cursor), &commit);
                cursor = next(cursor);
            }
        }
    }
}
