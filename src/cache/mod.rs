//! 块缓存模块
//!
//! 为元数据 I/O 提供写回缓存。
//!
//! # 主要组件
//!
//! - [`CacheBuffer`] - 单个缓存块，包含数据和状态标志
//! - [`BlockCache`] - 块缓存管理器，使用 lru crate 提供 LRU 驱逐
//! - [`CacheFlags`] - 缓存块状态标志
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 写回语义
//!
//! 写入只修改缓存并标记为脏；脏块从不被驱逐，只在
//! [`BlockCache::flush_all`] 时写回。恢复流程依赖这一点：
//! 清除 RECOVER 标志后的 superblock 在设备 flush 之前不会被视为已持久化。

mod buffer;
mod block_cache;

pub use buffer::{CacheBuffer, CacheFlags};
pub use block_cache::{BlockCache, CacheStats};
