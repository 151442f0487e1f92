//! ext4 常量定义
//!
//! 这个模块包含恢复流程用到的 ext4 常量，包括：
//! - 磁盘布局相关常量
//! - inode 模式与标志
//! - 特性标志
//! - 错误码

//=============================================================================
// 基础常量
//=============================================================================

/// 默认物理块大小（扇区大小，512 字节）
pub const EXT4_DEFAULT_SECTOR_SIZE: u32 = 512;

/// 最小块大小（1024 字节）
pub const EXT4_MIN_BLOCK_SIZE: u32 = 1024;

/// 最大块大小（65536 字节）
pub const EXT4_MAX_BLOCK_SIZE: u32 = 65536;

//=============================================================================
// Superblock 相关
//=============================================================================

/// Superblock 在设备上的字节偏移
pub const EXT4_SUPERBLOCK_OFFSET: u64 = 1024;

/// Superblock 大小（字节）
pub const EXT4_SUPERBLOCK_SIZE: usize = 1024;

/// ext4 魔数 (0xEF53)
pub const EXT4_SUPERBLOCK_MAGIC: u16 = 0xEF53;

/// Extent 树魔数 (0xF30A)
pub const EXT4_EXTENT_MAGIC: u16 = 0xF30A;

/// 默认的日志 inode 编号
pub const EXT4_JOURNAL_INO: u32 = 8;

/// 块组描述符大小（传统）
pub const EXT4_GROUP_DESC_SIZE: usize = 32;

/// 块组描述符大小（64位）
pub const EXT4_GROUP_DESC_SIZE_64: usize = 64;

/// 块组描述符最小大小
pub const EXT4_MIN_BLOCK_GROUP_DESCRIPTOR_SIZE: usize = 32;

/// 块组描述符最大大小
pub const EXT4_MAX_BLOCK_GROUP_DESCRIPTOR_SIZE: usize = 1024;

/// 校验和类型：CRC32C
pub const EXT4_CHECKSUM_CRC32C: u8 = 1;

/// superblock 中 checksum 字段的偏移
pub const EXT4_SUPERBLOCK_CHECKSUM_OFFSET: usize = 1020;

//=============================================================================
// Inode 相关
//=============================================================================

/// Inode 中的块指针总数（15个）
pub const EXT4_INODE_BLOCKS: usize = 15;

/// 直接块指针数量
pub const EXT4_INODE_DIRECT_BLOCKS: usize = 12;

/// 一级间接块索引
pub const EXT4_INODE_INDIRECT_BLOCK: usize = 12;

/// 二级间接块索引
pub const EXT4_INODE_DOUBLE_INDIRECT_BLOCK: usize = 13;

/// 三级间接块索引
pub const EXT4_INODE_TRIPLE_INDIRECT_BLOCK: usize = 14;

/// 旧的 inode 大小（不含扩展字段）
pub const EXT4_GOOD_OLD_INODE_SIZE: u16 = 128;

/// 文件类型掩码
pub const EXT4_INODE_MODE_TYPE_MASK: u16 = 0xF000;

/// 普通文件
pub const EXT4_INODE_MODE_FILE: u16 = 0x8000;

/// 使用 extent 树存储文件数据
pub const EXT4_INODE_FLAG_EXTENTS: u32 = 0x00080000;

/// 数据内联在 inode 中
pub const EXT4_INODE_FLAG_INLINE_DATA: u32 = 0x10000000;

/// 每个 inode 的最大 extent 深度
pub const EXT4_EXTENT_MAX_DEPTH: u16 = 5;

//=============================================================================
// 特性标志
//=============================================================================

/// 兼容特性：has journal
pub const EXT4_FEATURE_COMPAT_HAS_JOURNAL: u32 = 0x0004;

/// 不兼容特性：需要恢复
pub const EXT4_FEATURE_INCOMPAT_RECOVER: u32 = 0x0004;

/// 不兼容特性：日志设备
pub const EXT4_FEATURE_INCOMPAT_JOURNAL_DEV: u32 = 0x0008;

/// 不兼容特性：元数据块组
pub const EXT4_FEATURE_INCOMPAT_META_BG: u32 = 0x0010;

/// 不兼容特性：extent
pub const EXT4_FEATURE_INCOMPAT_EXTENTS: u32 = 0x0040;

/// 不兼容特性：64位
pub const EXT4_FEATURE_INCOMPAT_64BIT: u32 = 0x0080;

/// 只读兼容特性：稀疏 superblock 备份
pub const EXT4_FEATURE_RO_COMPAT_SPARSE_SUPER: u32 = 0x0001;

/// 只读兼容特性：元数据校验和
pub const EXT4_FEATURE_RO_COMPAT_METADATA_CSUM: u32 = 0x0400;

//=============================================================================
// 缓存相关
//=============================================================================

/// 默认块缓存大小（块数）
pub const CONFIG_BLOCK_DEV_CACHE_SIZE: usize = 256;

//=============================================================================
// 错误码（与 POSIX errno 兼容）
//=============================================================================

/// 没有此文件或目录
pub const ENOENT: i32 = 2;

/// I/O 错误
pub const EIO: i32 = 5;

/// 权限不足
pub const EACCES: i32 = 13;

/// 设备忙
pub const EBUSY: i32 = 16;

/// 无效参数
pub const EINVAL: i32 = 22;

/// 设备上没有空间
pub const ENOSPC: i32 = 28;

/// 只读文件系统
pub const EROFS: i32 = 30;

/// 不支持的操作
pub const ENOTSUP: i32 = 95;

/// 结构需要清理（文件系统损坏）
pub const EUCLEAN: i32 = 117;
