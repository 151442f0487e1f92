//! 元数据校验和计算
//!
//! superblock 和 journal superblock 的校验和都经由这里计算。
//! ext4 与 JBD2 使用 CRC32C（Castagnoli），种子为 `!0`，结果不做最终取反。

/// CRC32 初始值（ext4 使用 0xFFFFFFFF）
pub const EXT4_CRC32_INIT: u32 = !0u32;

/// 追加模式计算校验和
///
/// # 参数
/// * `crc` - 初始 CRC 值（上一段的结果，或 [`EXT4_CRC32_INIT`]）
/// * `data` - 要计算校验和的数据
#[inline]
pub fn crc32c_append(crc: u32, data: &[u8]) -> u32 {
    // crc32c crate 在内部做前后取反，这里换回原始寄存器值
    !crc32c::crc32c_append(!crc, data)
}
