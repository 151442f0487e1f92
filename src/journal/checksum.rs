//! Journal superblock 校验和
//!
//! 只在启用 CSUM_V2/CSUM_V3 时计算，校验范围是整个 superblock，
//! 计算时 checksum 字段按 0 处理。

use super::types::{JournalSuperblock, JBD_SB_CHECKSUM_OFFSET};
use crate::crc::{crc32c_append, EXT4_CRC32_INIT};

/// 计算 journal superblock 校验和
pub fn compute_sb_checksum(sb: &JournalSuperblock) -> u32 {
    let raw = sb.as_bytes();
    let crc = crc32c_append(EXT4_CRC32_INIT, &raw[..JBD_SB_CHECKSUM_OFFSET]);
    let crc = crc32c_append(crc, &[0u8; 4]);
    crc32c_append(crc, &raw[JBD_SB_CHECKSUM_OFFSET + 4..])
}

/// 验证 journal superblock 校验和，未启用校验和时总是成功
pub fn verify_sb_checksum(sb: &JournalSuperblock) -> bool {
    !sb.has_csum_v2or3() || compute_sb_checksum(sb) == sb.checksum()
}

/// 写回前更新校验和
pub fn set_sb_checksum(sb: &mut JournalSuperblock) {
    if sb.has_csum_v2or3() {
        let csum = compute_sb_checksum(sb);
        sb.set_checksum_field(csum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::types::tests::jsb_bytes;
    use crate::journal::types::JBD_FEATURE_INCOMPAT_CSUM_V3;

    #[test]
    fn test_checksum_roundtrip_and_tamper() {
        let mut sb =
            JournalSuperblock::parse(&jsb_bytes(1024, 64, JBD_FEATURE_INCOMPAT_CSUM_V3)).unwrap();
        set_sb_checksum(&mut sb);
        assert!(verify_sb_checksum(&sb));

        // checksum 字段本身不参与计算
        let before = compute_sb_checksum(&sb);
        sb.set_checksum_field(0x1234);
        assert_eq!(compute_sb_checksum(&sb), before);

        sb.set_start(9);
        sb.set_checksum_field(before);
        assert!(!verify_sb_checksum(&sb));
    }

    #[test]
    fn test_no_checksum_feature() {
        let mut sb = JournalSuperblock::parse(&jsb_bytes(1024, 64, 0)).unwrap();
        set_sb_checksum(&mut sb);
        assert_eq!(sb.checksum(), 0);
        assert!(verify_sb_checksum(&sb));
    }
}
