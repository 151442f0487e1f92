//! Journal 恢复逻辑
//!
//! 日志按三遍处理：
//!
//! 1. `Scan`   - 从 `start` 开始沿序列号前进，找到最后一个完整提交的事务
//! 2. `Revoke` - 收集已提交事务中的撤销记录（块号 -> 最新撤销序列号）
//! 3. `Replay` - 把已提交事务的数据块写回原位置，跳过被撤销的块
//!
//! 没有提交块的尾部事务被忽略。完成后日志被标记为空：
//! `start = 0`，`sequence = end + 1`。

use super::{types::*, JbdFs, JournalError};
use crate::{
    block::{BlockDev, BlockDevice},
    error::Result,
    superblock::Superblock,
};
use alloc::collections::BTreeMap;
use byteorder::{BigEndian, ByteOrder};

/// 恢复统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryInfo {
    /// 日志中第一个事务的序列号
    pub start_sequence: u32,
    /// 第一个未提交（不存在）的事务序列号
    pub end_sequence: u32,
    /// 写回原位置的块数
    pub replayed_blocks: u32,
    /// 因撤销而跳过的块数
    pub revoked_blocks: u32,
    /// 撤销记录数
    pub revoke_records: u32,
}

impl RecoveryInfo {
    /// 已提交的事务数
    pub fn committed_transactions(&self) -> u32 {
        self.end_sequence.wrapping_sub(self.start_sequence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Scan,
    Revoke,
    Replay,
}

/// 撤销表：块号 -> 撤销它的最新事务序列号
#[derive(Debug, Default)]
pub struct RevokeTable {
    entries: BTreeMap<u64, u32>,
}

impl RevokeTable {
    /// 记录撤销，已有记录时保留较新的序列号
    pub fn set(&mut self, block: u64, sequence: u32) {
        self.entries
            .entry(block)
            .and_modify(|seq| {
                if tid_gt(sequence, *seq) {
                    *seq = sequence;
                }
            })
            .or_insert(sequence);
    }

    /// 事务 `sequence` 中的 `block` 是否被同一或更晚的事务撤销
    pub fn is_revoked(&self, block: u64, sequence: u32) -> bool {
        match self.entries.get(&block) {
            Some(&revoked_at) => !tid_gt(sequence, revoked_at),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 序列号回绕比较：`a` 是否比 `b` 新
fn tid_gt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// 执行 journal 恢复
///
/// 日志为空（`start == 0`）时直接返回，不写任何块。
pub fn recover<D: BlockDevice>(
    jbd_fs: &mut JbdFs,
    bdev: &mut BlockDev<D>,
    superblock: &Superblock,
) -> Result<RecoveryInfo> {
    if jbd_fs.start() == 0 {
        log::info!("[JOURNAL] journal is empty, no recovery required");
        return Ok(RecoveryInfo {
            start_sequence: jbd_fs.sequence(),
            end_sequence: jbd_fs.sequence(),
            ..RecoveryInfo::default()
        });
    }

    let mut info = RecoveryInfo::default();
    let mut revoke = RevokeTable::default();

    do_one_pass(jbd_fs, bdev, superblock, Pass::Scan, &mut info, &mut revoke)?;
    do_one_pass(jbd_fs, bdev, superblock, Pass::Revoke, &mut info, &mut revoke)?;
    do_one_pass(jbd_fs, bdev, superblock, Pass::Replay, &mut info, &mut revoke)?;

    log::info!(
        "[JOURNAL] recovery complete: transactions {}..{}, {} blocks replayed, {} revoked",
        info.start_sequence,
        info.end_sequence,
        info.replayed_blocks,
        info.revoked_blocks
    );

    // 回放的数据落盘之后才能清空日志
    bdev.flush()?;

    jbd_fs.set_sequence(info.end_sequence.wrapping_add(1));
    jbd_fs.set_start(0);
    jbd_fs.put(bdev, superblock)?;
    bdev.flush()?;

    Ok(info)
}

/// 跳过恢复，丢弃日志内容
///
/// 只扫描出结束序列号。`writable` 为 false 时只更新内存中的状态。
pub fn wipe<D: BlockDevice>(
    jbd_fs: &mut JbdFs,
    bdev: &mut BlockDev<D>,
    superblock: &Superblock,
    writable: bool,
) -> Result<RecoveryInfo> {
    if jbd_fs.start() == 0 {
        log::debug!("[JOURNAL] wipe: journal already empty");
        return Ok(RecoveryInfo {
            start_sequence: jbd_fs.sequence(),
            end_sequence: jbd_fs.sequence(),
            ..RecoveryInfo::default()
        });
    }

    let mut info = RecoveryInfo::default();
    let mut revoke = RevokeTable::default();
    do_one_pass(jbd_fs, bdev, superblock, Pass::Scan, &mut info, &mut revoke)?;

    log::warn!(
        "[JOURNAL] ignoring {} committed transaction(s) from {}",
        info.committed_transactions(),
        info.start_sequence
    );

    jbd_fs.set_sequence(info.end_sequence.wrapping_add(1));
    jbd_fs.set_start(0);
    if writable {
        jbd_fs.put(bdev, superblock)?;
        bdev.flush()?;
    }

    Ok(info)
}

/// 沿日志走一遍
fn do_one_pass<D: BlockDevice>(
    jbd_fs: &JbdFs,
    bdev: &mut BlockDev<D>,
    superblock: &Superblock,
    pass: Pass,
    info: &mut RecoveryInfo,
    revoke: &mut RevokeTable,
) -> Result<()> {
    let mut next_commit_id = jbd_fs.sequence();
    let mut next_log_block = jbd_fs.start();
    let mut visited: u32 = 0;

    if pass == Pass::Scan {
        info.start_sequence = next_commit_id;
    }

    loop {
        // 非扫描遍只处理扫描遍确认过的事务
        if pass != Pass::Scan && !tid_gt(info.end_sequence, next_commit_id) {
            break;
        }

        let data = jbd_fs.read_block(bdev, superblock, next_log_block)?;
        let header = match JournalHeader::parse(&data) {
            Some(h) if h.verify_magic() && h.sequence == next_commit_id => h,
            _ => break,
        };

        visited = step(jbd_fs, visited)?;
        next_log_block = jbd_fs.next_block(next_log_block);

        match header.blocktype {
            JBD_DESCRIPTOR_BLOCK => {
                let tags_end = descriptor_tags_end(jbd_fs, data.len());
                let mut offset = JBD_HEADER_SIZE;
                let tag_bytes = jbd_fs.sb().tag_bytes();

                while offset + tag_bytes <= tags_end {
                    let tag = jbd_fs.sb().parse_tag(&data, offset);
                    offset += tag_bytes;
                    if tag.has_uuid() {
                        offset += UUID_SIZE;
                    }

                    if pass == Pass::Replay {
                        replay_block(jbd_fs, bdev, superblock, next_log_block, &tag, next_commit_id, info, revoke)?;
                    }

                    visited = step(jbd_fs, visited)?;
                    next_log_block = jbd_fs.next_block(next_log_block);

                    if tag.is_last() {
                        break;
                    }
                }
            }
            JBD_COMMIT_BLOCK => {
                next_commit_id = next_commit_id.wrapping_add(1);
            }
            JBD_REVOKE_BLOCK => {
                if pass == Pass::Revoke {
                    scan_revoke_records(jbd_fs, &data, next_commit_id, info, revoke)?;
                }
            }
            other => {
                log::warn!(
                    "[JOURNAL] unrecognised block type {} at sequence {}, stopping",
                    other,
                    next_commit_id
                );
                break;
            }
        }
    }

    if pass == Pass::Scan {
        info.end_sequence = next_commit_id;
        log::debug!(
            "[JOURNAL] scan: start seq {} end seq {}",
            info.start_sequence,
            info.end_sequence
        );
    } else if next_commit_id != info.end_sequence {
        log::error!(
            "[JOURNAL] {:?} pass ended at {}, scan ended at {}",
            pass,
            next_commit_id,
            info.end_sequence
        );
        return Err(JournalError::RecoveryFailed.into());
    }

    Ok(())
}

/// 一遍中访问的块数不能超过日志长度，否则日志已损坏
fn step(jbd_fs: &JbdFs, visited: u32) -> Result<u32> {
    let visited = visited + 1;
    if visited > jbd_fs.max_len() {
        log::error!("[JOURNAL] log walk exceeded journal length {}", jbd_fs.max_len());
        return Err(JournalError::MalformedBlock.into());
    }
    Ok(visited)
}

/// descriptor 块中 tag 区域的结束位置
fn descriptor_tags_end(jbd_fs: &JbdFs, block_size: usize) -> usize {
    if jbd_fs.sb().has_csum_v2or3() {
        block_size - JBD_TAIL_SIZE
    } else {
        block_size
    }
}

#[allow(clippy::too_many_arguments)]
fn replay_block<D: BlockDevice>(
    jbd_fs: &JbdFs,
    bdev: &mut BlockDev<D>,
    superblock: &Superblock,
    journal_block: u32,
    tag: &BlockTag,
    sequence: u32,
    info: &mut RecoveryInfo,
    revoke: &RevokeTable,
) -> Result<()> {
    if revoke.is_revoked(tag.blocknr, sequence) {
        log::debug!(
            "[JOURNAL] skip revoked block {:#x} (seq {})",
            tag.blocknr,
            sequence
        );
        info.revoked_blocks += 1;
        return Ok(());
    }

    if tag.blocknr >= bdev.total_blocks() {
        log::error!("[JOURNAL] tag targets block {:#x} beyond device", tag.blocknr);
        return Err(JournalError::MalformedBlock.into());
    }

    let mut data = jbd_fs.read_block(bdev, superblock, journal_block)?;
    if tag.is_escaped() {
        BigEndian::write_u32(&mut data[0..], JBD_MAGIC_NUMBER);
    }

    bdev.write_block(tag.blocknr, &data)?;
    info.replayed_blocks += 1;
    log::trace!(
        "[JOURNAL] replayed journal block {} -> {:#x} (seq {})",
        journal_block,
        tag.blocknr,
        sequence
    );
    Ok(())
}

fn scan_revoke_records(
    jbd_fs: &JbdFs,
    data: &[u8],
    sequence: u32,
    info: &mut RecoveryInfo,
    revoke: &mut RevokeTable,
) -> Result<()> {
    let header_size = JBD_HEADER_SIZE + 4;
    let count = BigEndian::read_u32(&data[JBD_HEADER_SIZE..]) as usize;
    let limit = if jbd_fs.sb().has_csum_v2or3() {
        data.len() - JBD_TAIL_SIZE
    } else {
        data.len()
    };
    if count < header_size || count > limit {
        log::error!("[JOURNAL] revoke block with bad byte count {}", count);
        return Err(JournalError::MalformedBlock.into());
    }

    let record_size = jbd_fs.sb().revoke_record_bytes();
    let mut offset = header_size;
    while offset + record_size <= count {
        let block = if record_size == 8 {
            BigEndian::read_u64(&data[offset..])
        } else {
            BigEndian::read_u32(&data[offset..]) as u64
        };
        revoke.set(block, sequence);
        info.revoke_records += 1;
        offset += record_size;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;
    use crate::inode::Inode;
    use crate::test_utils::{ImageBuilder, Txn};
    use alloc::vec;

    fn open(builder: ImageBuilder) -> (BlockDev<MemDevice>, Superblock, JbdFs) {
        let (mut bdev, sb) = builder.build_volume();
        let inode = Inode::load(&mut bdev, &sb, sb.journal_inum()).unwrap();
        let jbd = JbdFs::load(&mut bdev, &sb, inode).unwrap();
        (bdev, sb, jbd)
    }

    #[test]
    fn test_tid_gt_wraps() {
        assert!(tid_gt(2, 1));
        assert!(!tid_gt(1, 1));
        assert!(tid_gt(0, u32::MAX));
    }

    #[test]
    fn test_revoke_table_keeps_newest() {
        let mut table = RevokeTable::default();
        table.set(100, 5);
        table.set(100, 3);
        assert!(table.is_revoked(100, 5));
        assert!(table.is_revoked(100, 4));
        assert!(!table.is_revoked(100, 6));
        assert!(!table.is_revoked(101, 1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_replay_committed_in_order() {
        let (mut bdev, sb, mut jbd) = open(
            ImageBuilder::new()
                .txn(Txn::new(7).block(100, 0xAA).block(101, 0xBB))
                .txn(Txn::new(8).block(100, 0xCC)),
        );

        let info = recover(&mut jbd, &mut bdev, &sb).unwrap();
        assert_eq!(info.start_sequence, 7);
        assert_eq!(info.end_sequence, 9);
        assert_eq!(info.replayed_blocks, 3);

        let dev = bdev.device();
        assert!(dev.durable_block(100).iter().all(|&b| b == 0xCC));
        assert!(dev.durable_block(101).iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn test_uncommitted_tail_ignored() {
        let (mut bdev, sb, mut jbd) = open(
            ImageBuilder::new()
                .txn(Txn::new(1).block(100, 0x11))
                .txn(Txn::new(2).block(101, 0x22).uncommitted()),
        );

        let info = recover(&mut jbd, &mut bdev, &sb).unwrap();
        assert_eq!(info.committed_transactions(), 1);
        assert!(bdev.device().durable_block(100).iter().all(|&b| b == 0x11));
        assert!(bdev.device().durable_block(101).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_revoked_block_not_replayed() {
        let (mut bdev, sb, mut jbd) = open(
            ImageBuilder::new()
                .txn(Txn::new(1).block(100, 0x11).block(102, 0x33))
                .txn(Txn::new(2).revoke(100)),
        );

        let info = recover(&mut jbd, &mut bdev, &sb).unwrap();
        assert_eq!(info.revoke_records, 1);
        assert_eq!(info.revoked_blocks, 1);
        assert!(bdev.device().durable_block(100).iter().all(|&b| b == 0));
        assert!(bdev.device().durable_block(102).iter().all(|&b| b == 0x33));
    }

    #[test]
    fn test_block_rewritten_after_revoke_is_replayed() {
        let (mut bdev, sb, mut jbd) = open(
            ImageBuilder::new()
                .txn(Txn::new(1).block(100, 0x11))
                .txn(Txn::new(2).revoke(100))
                .txn(Txn::new(3).block(100, 0x44)),
        );

        recover(&mut jbd, &mut bdev, &sb).unwrap();
        assert!(bdev.device().durable_block(100).iter().all(|&b| b == 0x44));
    }

    #[test]
    fn test_revoke_in_uncommitted_txn_ignored() {
        let (mut bdev, sb, mut jbd) = open(
            ImageBuilder::new()
                .txn(Txn::new(1).block(100, 0x11))
                .txn(Txn::new(2).revoke(100).uncommitted()),
        );

        recover(&mut jbd, &mut bdev, &sb).unwrap();
        assert!(bdev.device().durable_block(100).iter().all(|&b| b == 0x11));
    }

    #[test]
    fn test_escaped_block_restored() {
        let mut payload = vec![0x5Au8; 1024];
        BigEndian::write_u32(&mut payload[0..], JBD_MAGIC_NUMBER);
        let (mut bdev, sb, mut jbd) =
            open(ImageBuilder::new().txn(Txn::new(1).raw_block(103, payload.clone())));

        recover(&mut jbd, &mut bdev, &sb).unwrap();
        assert_eq!(bdev.device().durable_block(103), &payload[..]);
    }

    #[test]
    fn test_journal_marked_empty_after_recovery() {
        let builder = ImageBuilder::new().txn(Txn::new(4).block(100, 0x11));
        let (mut bdev, sb, mut jbd) = open(builder);

        recover(&mut jbd, &mut bdev, &sb).unwrap();
        assert_eq!(jbd.start(), 0);
        assert_eq!(jbd.sequence(), 6);

        // 持久视图中的 journal superblock 也已更新
        let inode = Inode::load(&mut bdev, &sb, 8).unwrap();
        let reloaded = JbdFs::load(&mut bdev, &sb, inode).unwrap();
        assert_eq!(reloaded.start(), 0);
        assert_eq!(reloaded.sequence(), 6);
    }

    #[test]
    fn test_log_wraps_around() {
        // 从倒数第二块开始写，descriptor + 2 数据块 + commit 会回绕
        let start = ImageBuilder::JOURNAL_LEN - 2;
        let (mut bdev, sb, mut jbd) = open(
            ImageBuilder::new()
                .log_start(start)
                .txn(Txn::new(1).block(100, 0x11).block(101, 0x22)),
        );

        let info = recover(&mut jbd, &mut bdev, &sb).unwrap();
        assert_eq!(info.replayed_blocks, 2);
        assert!(bdev.device().durable_block(101).iter().all(|&b| b == 0x22));
    }

    #[test]
    fn test_indirect_mapped_journal() {
        let (mut bdev, sb, mut jbd) = open(
            ImageBuilder::new()
                .indirect_journal()
                .log_start(10)
                .txn(Txn::new(1).block(100, 0x11).block(101, 0x22).block(102, 0x33)),
        );

        let info = recover(&mut jbd, &mut bdev, &sb).unwrap();
        assert_eq!(info.replayed_blocks, 3);
        assert!(bdev.device().durable_block(102).iter().all(|&b| b == 0x33));
    }

    #[test]
    fn test_64bit_and_csum_v3_layouts() {
        for features in [JBD_FEATURE_INCOMPAT_64BIT, JBD_FEATURE_INCOMPAT_CSUM_V3 | JBD_FEATURE_INCOMPAT_64BIT] {
            let (mut bdev, sb, mut jbd) = open(
                ImageBuilder::new()
                    .journal_incompat(features)
                    .txn(Txn::new(1).block(100, 0x11).block(101, 0x22))
                    .txn(Txn::new(2).revoke(101)),
            );

            let info = recover(&mut jbd, &mut bdev, &sb).unwrap();
            assert_eq!(info.replayed_blocks, 1);
            assert_eq!(info.revoked_blocks, 1);
        }
    }

    #[test]
    fn test_empty_journal_writes_nothing() {
        let (mut bdev, sb, mut jbd) = open(ImageBuilder::new());
        bdev.device_mut().clear_ops();

        let info = recover(&mut jbd, &mut bdev, &sb).unwrap();
        assert_eq!(info.committed_transactions(), 0);
        assert_eq!(bdev.device().write_ops(), 0);
    }

    #[test]
    fn test_wipe_discards_without_replay() {
        let (mut bdev, sb, mut jbd) = open(ImageBuilder::new().txn(Txn::new(3).block(100, 0x11)));

        let info = wipe(&mut jbd, &mut bdev, &sb, true).unwrap();
        assert_eq!(info.end_sequence, 4);
        assert_eq!(jbd.start(), 0);
        assert_eq!(jbd.sequence(), 5);
        assert!(bdev.device().durable_block(100).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wipe_read_only_does_not_write() {
        let (mut bdev, sb, mut jbd) = open(ImageBuilder::new().txn(Txn::new(3).block(100, 0x11)));
        bdev.device_mut().clear_ops();

        wipe(&mut jbd, &mut bdev, &sb, false).unwrap();
        assert_eq!(jbd.start(), 0);
        assert_eq!(bdev.device().write_ops(), 0);
    }
}
