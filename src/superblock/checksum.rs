//! Superblock 校验和计算

use super::Superblock;
use crate::{
    consts::{EXT4_CHECKSUM_CRC32C, EXT4_SUPERBLOCK_CHECKSUM_OFFSET},
    crc::EXT4_CRC32_INIT,
};
use byteorder::{ByteOrder, LittleEndian};

/// 计算 superblock 校验和（覆盖 checksum 字段之前的全部字节）
pub fn compute_checksum(sb: &Superblock) -> u32 {
    crate::crc::crc32c_append(EXT4_CRC32_INIT, &sb.raw[..EXT4_SUPERBLOCK_CHECKSUM_OFFSET])
}

/// 验证 superblock 校验和
///
/// 未启用 METADATA_CSUM 时总是返回 `true`
pub fn verify_checksum(sb: &Superblock) -> bool {
    if !sb.has_metadata_csum() {
        return true;
    }

    if sb.checksum_type() != EXT4_CHECKSUM_CRC32C {
        return false;
    }

    compute_checksum(sb) == stored_checksum(sb)
}

/// 重新计算并写入 superblock 校验和
pub fn set_checksum(sb: &mut Superblock) {
    if !sb.has_metadata_csum() {
        return;
    }

    let csum = compute_checksum(sb);
    LittleEndian::write_u32(&mut sb.raw[EXT4_SUPERBLOCK_CHECKSUM_OFFSET..], csum);
}

fn stored_checksum(sb: &Superblock) -> u32 {
    LittleEndian::read_u32(&sb.raw[EXT4_SUPERBLOCK_CHECKSUM_OFFSET..])
}
