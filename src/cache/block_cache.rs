//! 块缓存实现（基于 lru crate）
//!
//! ```text
//! struct BlockCache {
//!     cache: LruCache<u64, CacheBuffer>,  // O(1)，自动LRU
//!     dirty_set: BTreeSet<u64>,           // 追踪脏块，按地址有序写回
//!     block_size: usize,
//!     stats: CacheStats,
//! }
//! ```

use crate::error::{Error, ErrorKind, Result};

use super::buffer::CacheBuffer;
use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::num::NonZeroUsize;
use lru::LruCache;

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 总访问次数
    pub total_accesses: u64,
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 脏块写回次数
    pub writebacks: u64,
    /// 当前脏块数量
    pub dirty_blocks: usize,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

/// 块缓存
///
/// 脏块绝不被驱逐；缓存满且全部为脏时 [`BlockCache::write`] 返回
/// `NoSpace`，调用者应先 [`BlockCache::flush_all`] 再重试。
pub struct BlockCache {
    /// LRU缓存核心
    cache: LruCache<u64, CacheBuffer>,

    /// 脏块集合：追踪需要写回的块
    dirty_set: BTreeSet<u64>,

    /// 块大小（字节）
    block_size: usize,

    /// 统计信息
    stats: CacheStats,
}

impl BlockCache {
    /// 创建新的块缓存
    ///
    /// # 参数
    ///
    /// * `capacity` - 缓存容量（块数量，0 按 1 处理）
    /// * `block_size` - 块大小（字节）
    pub fn new(capacity: usize, block_size: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            dirty_set: BTreeSet::new(),
            block_size,
            stats: CacheStats::default(),
        }
    }

    /// 查找有效块，命中时更新 LRU 顺序
    pub fn lookup(&mut self, lba: u64) -> Option<&[u8]> {
        self.stats.total_accesses += 1;
        match self.cache.get(&lba) {
            Some(buf) if buf.is_uptodate() => {
                self.stats.hits += 1;
                Some(&buf.data)
            }
            _ => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// 把从设备读到的块放入缓存
    ///
    /// 没有可驱逐的干净块时直接放弃缓存，读路径不因此失败
    pub fn insert_clean(&mut self, lba: u64, data: &[u8]) {
        if self.cache.contains(&lba) {
            return;
        }
        if self.is_full() && self.evict_clean().is_err() {
            log::trace!("[CACHE] skip caching LBA={:#x}, no clean block to evict", lba);
            return;
        }
        let mut buf = CacheBuffer::new(lba, self.block_size);
        buf.data.copy_from_slice(&data[..self.block_size]);
        buf.mark_uptodate();
        self.cache.put(lba, buf);
    }

    /// 写入块并标记为脏
    pub fn write(&mut self, lba: u64, data: &[u8]) -> Result<()> {
        if !self.cache.contains(&lba) {
            if self.is_full() {
                self.evict_clean()?;
            }
            self.cache.put(lba, CacheBuffer::new(lba, self.block_size));
        }

        if let Some(buf) = self.cache.get_mut(&lba) {
            buf.data.copy_from_slice(&data[..self.block_size]);
            buf.mark_uptodate();
            buf.mark_dirty();
        }
        if self.dirty_set.insert(lba) {
            log::debug!("[CACHE] mark_dirty LBA={:#x}, total_dirty={}", lba, self.dirty_set.len());
        }
        Ok(())
    }

    /// 把所有脏块交给 `write` 写回，按块地址升序
    ///
    /// 某块写回失败时立即返回错误，该块及其后的块保持为脏
    pub fn flush_all<F>(&mut self, mut write: F) -> Result<usize>
    where
        F: FnMut(u64, &[u8]) -> Result<usize>,
    {
        let dirty_lbas: Vec<u64> = self.dirty_set.iter().copied().collect();
        let count = dirty_lbas.len();

        if count > 0 {
            log::debug!("[CACHE] Flushing {} dirty blocks", count);
        }

        for lba in dirty_lbas {
            if let Some(buf) = self.cache.peek_mut(&lba) {
                write(lba, &buf.data)?;
                buf.clear_dirty();
                self.stats.writebacks += 1;
            }
            self.dirty_set.remove(&lba);
        }

        Ok(count)
    }

    /// 使块无效（从缓存中移除，脏数据被丢弃）
    pub fn invalidate(&mut self, lba: u64) {
        self.cache.pop(&lba);
        self.dirty_set.remove(&lba);
    }

    /// 当前脏块数
    pub fn dirty_count(&self) -> usize {
        self.dirty_set.len()
    }

    /// 获取统计信息
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            dirty_blocks: self.dirty_set.len(),
            ..self.stats.clone()
        }
    }

    fn is_full(&self) -> bool {
        self.cache.len() >= self.cache.cap().get()
    }

    /// 从 LRU 端开始驱逐第一个干净块
    fn evict_clean(&mut self) -> Result<()> {
        // iter() 按 MRU 到 LRU 顺序遍历，rev() 后从最老的开始
        let victim = self
            .cache
            .iter()
            .rev()
            .map(|(lba, _)| *lba)
            .find(|lba| !self.dirty_set.contains(lba));

        match victim {
            Some(lba) => {
                self.cache.pop(&lba);
                log::trace!("[CACHE] Evicted clean block LBA={:#x}", lba);
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::NoSpace,
                "All cache blocks are dirty, cannot evict",
            )),
        }
    }
}
