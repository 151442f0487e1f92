//! 块设备核心类型

use crate::cache::BlockCache;
use crate::error::{Error, ErrorKind, Result};

/// 块设备接口
///
/// 实现此 trait 以提供底层块设备访问。
///
/// # 示例
///
/// ```rust,ignore
/// use lwext4_recovery::{BlockDevice, Result};
///
/// struct MyDevice {
///     // ...
/// }
///
/// impl BlockDevice for MyDevice {
///     fn block_size(&self) -> u32 {
///         4096
///     }
///
///     fn sector_size(&self) -> u32 {
///         512
///     }
///
///     fn total_blocks(&self) -> u64 {
///         1000000
///     }
///
///     fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
///         // 实现扇区读取
///         Ok(count as usize * self.sector_size() as usize)
///     }
///
///     fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
///         // 实现扇区写入
///         Ok(count as usize * self.sector_size() as usize)
///     }
/// }
/// ```
pub trait BlockDevice {
    /// 逻辑块大小（必须与文件系统块大小一致）
    fn block_size(&self) -> u32;

    /// 物理扇区大小（通常 512）
    fn sector_size(&self) -> u32;

    /// 总块数
    fn total_blocks(&self) -> u64;

    /// 读取扇区
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址（以扇区为单位）
    /// * `count` - 要读取的扇区数
    /// * `buf` - 目标缓冲区（大小至少为 count * sector_size）
    ///
    /// # 返回
    ///
    /// 成功返回实际读取的字节数
    fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize>;

    /// 写入扇区
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址（以扇区为单位）
    /// * `count` - 要写入的扇区数
    /// * `buf` - 源缓冲区（大小至少为 count * sector_size）
    ///
    /// # 返回
    ///
    /// 成功返回实际写入的字节数
    fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize>;

    /// 刷新设备缓存，返回后此前写入的数据必须已持久化
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// 是否只读
    fn is_read_only(&self) -> bool {
        false
    }
}

/// 块设备包装器
///
/// 为 ext4 元数据访问提供块级读写，包含统计信息和可选的写回缓存。
///
/// BlockDev 本身不包含锁；恢复流程通过卷级排他锁（见 [`crate::fs::Volume`]）
/// 独占访问它。
pub struct BlockDev<D> {
    /// 底层设备
    device: D,
    /// 逻辑读取次数（包括缓存命中）
    read_count: u64,
    /// 逻辑写入次数（包括缓存写入）
    write_count: u64,
    /// 物理读取次数（实际设备操作）
    physical_read_count: u64,
    /// 物理写入次数（实际设备操作）
    physical_write_count: u64,
    /// 刷新次数
    flush_count: u64,
    /// 块缓存（可选）
    pub(super) bcache: Option<BlockCache>,
}

impl<D: BlockDevice> BlockDev<D> {
    /// 创建新的块设备包装器（无缓存）
    pub fn new(device: D) -> Result<Self> {
        let block_size = device.block_size();
        let sector_size = device.sector_size();

        if sector_size == 0 || block_size % sector_size != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Block size must be a multiple of sector size",
            ));
        }

        Ok(Self {
            device,
            read_count: 0,
            write_count: 0,
            physical_read_count: 0,
            physical_write_count: 0,
            flush_count: 0,
            bcache: None,
        })
    }

    /// 创建带缓存的块设备包装器
    ///
    /// `cache_blocks` 为 0 时等价于 [`BlockDev::new`]
    pub fn new_with_cache(device: D, cache_blocks: usize) -> Result<Self> {
        let mut bd = Self::new(device)?;
        if cache_blocks > 0 {
            let block_size = bd.block_size() as usize;
            bd.bcache = Some(BlockCache::new(cache_blocks, block_size));
        }
        Ok(bd)
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取底层设备的可变引用
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 取出底层设备（不会自动刷新）
    pub fn into_device(self) -> D {
        self.device
    }

    /// 获取逻辑块大小
    pub fn block_size(&self) -> u32 {
        self.device.block_size()
    }

    /// 获取总块数
    pub fn total_blocks(&self) -> u64 {
        self.device.total_blocks()
    }

    /// 设备是否只读
    pub fn is_read_only(&self) -> bool {
        self.device.is_read_only()
    }

    /// 获取逻辑读取次数（包括缓存命中）
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// 获取逻辑写入次数（包括缓存写入）
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// 获取物理读取次数（实际设备操作）
    pub fn physical_read_count(&self) -> u64 {
        self.physical_read_count
    }

    /// 获取物理写入次数（实际设备操作）
    pub fn physical_write_count(&self) -> u64 {
        self.physical_write_count
    }

    /// 获取设备刷新次数
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// 检查是否启用了缓存
    pub fn has_cache(&self) -> bool {
        self.bcache.is_some()
    }

    /// 获取缓存统计信息
    pub fn cache_stats(&self) -> Option<crate::cache::CacheStats> {
        self.bcache.as_ref().map(|cache| cache.stats())
    }

    /// 缓存中尚未写回的脏块数
    pub fn dirty_blocks(&self) -> usize {
        self.bcache.as_ref().map(|c| c.dirty_count()).unwrap_or(0)
    }

    // 内部辅助方法

    /// 将逻辑块地址转换为物理扇区地址
    pub(super) fn logical_to_physical(&self, lba: u64) -> u64 {
        let block_size = self.device.block_size() as u64;
        let sector_size = self.device.sector_size() as u64;
        lba * block_size / sector_size
    }

    /// 每个逻辑块包含的物理扇区数
    pub(super) fn sectors_per_block(&self) -> u32 {
        self.device.block_size() / self.device.sector_size()
    }

    pub(super) fn inc_read_count(&mut self) {
        self.read_count += 1;
    }

    pub(super) fn inc_write_count(&mut self) {
        self.write_count += 1;
    }

    pub(super) fn inc_flush_count(&mut self) {
        self.flush_count += 1;
    }

    /// 直接从设备读取一个逻辑块（绕过缓存）
    pub(super) fn device_read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<usize> {
        if lba >= self.device.total_blocks() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Block address beyond end of device",
            ));
        }
        let pba = self.logical_to_physical(lba);
        let count = self.sectors_per_block();
        self.physical_read_count += 1;
        self.device.read_blocks(pba, count, buf)
    }

    /// 直接向设备写入一个逻辑块（绕过缓存）
    pub(super) fn device_write_block(&mut self, lba: u64, buf: &[u8]) -> Result<usize> {
        if lba >= self.device.total_blocks() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Block address beyond end of device",
            ));
        }
        let pba = self.logical_to_physical(lba);
        let count = self.sectors_per_block();
        self.physical_write_count += 1;
        self.device.write_blocks(pba, count, buf)
    }

    /// 使一个块的缓存失效
    ///
    /// 脏块会被直接丢弃，调用者需确认不再需要其内容
    pub fn invalidate_cache_block(&mut self, lba: u64) {
        if let Some(cache) = &mut self.bcache {
            cache.invalidate(lba);
        }
    }
}
