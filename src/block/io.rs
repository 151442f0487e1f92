//! 块 I/O 操作实现

use super::{BlockDev, BlockDevice};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec;

impl<D: BlockDevice> BlockDev<D> {
    /// 读取单个逻辑块
    ///
    /// 如果启用了缓存，优先从缓存读取；缓存未命中则从设备读取并填充缓存。
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    /// * `buf` - 目标缓冲区（大小至少为 block_size）
    ///
    /// # 返回
    ///
    /// 成功返回读取的字节数
    pub fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<usize> {
        let block_size = self.block_size() as usize;

        if buf.len() < block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer too small for block",
            ));
        }

        self.inc_read_count();

        if let Some(cache) = &mut self.bcache {
            if let Some(data) = cache.lookup(lba) {
                buf[..block_size].copy_from_slice(data);
                return Ok(block_size);
            }
        }

        let n = self.device_read_block(lba, &mut buf[..block_size])?;

        if let Some(cache) = &mut self.bcache {
            cache.insert_clean(lba, &buf[..block_size]);
        }

        Ok(n)
    }

    /// 写入单个逻辑块
    ///
    /// 如果启用了缓存，写入缓存并标记为脏，直到 [`BlockDev::flush`] 才落盘；
    /// 否则直接写入设备。
    pub fn write_block(&mut self, lba: u64, buf: &[u8]) -> Result<usize> {
        let block_size = self.block_size() as usize;

        if buf.len() < block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer too small for block",
            ));
        }
        if self.is_read_only() {
            return Err(Error::new(ErrorKind::ReadOnly, "write to read-only device"));
        }
        if lba >= self.total_blocks() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Block address beyond end of device",
            ));
        }

        self.inc_write_count();

        if self.bcache.is_some() {
            let needs_writeback = match &mut self.bcache {
                Some(cache) => cache.write(lba, &buf[..block_size]).is_err(),
                None => false,
            };

            if needs_writeback {
                // 缓存已满且全部为脏块：先写回再重试
                log::warn!("[BLOCK] cache full of dirty blocks, writing back before LBA={:#x}", lba);
                self.write_back_cache()?;
                if let Some(cache) = &mut self.bcache {
                    cache.write(lba, &buf[..block_size])?;
                }
            }
            return Ok(block_size);
        }

        self.device_write_block(lba, &buf[..block_size])
    }

    /// 读取字节
    ///
    /// 从任意字节偏移读取，自动处理跨块情况。
    ///
    /// # 示例
    ///
    /// ```rust,ignore
    /// let mut buf = vec![0u8; 1024];
    /// block_dev.read_bytes(1024, &mut buf)?;
    /// ```
    pub fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len();
        let block_size = self.block_size() as u64;

        let start_block = offset / block_size;
        let block_offset = (offset % block_size) as usize;

        let total_size = block_offset + len;
        let block_count = (total_size as u64).div_ceil(block_size) as usize;

        let mut temp = vec![0u8; block_count * block_size as usize];

        for i in 0..block_count {
            let lba = start_block + i as u64;
            let block_buf = &mut temp[i * block_size as usize..(i + 1) * block_size as usize];
            self.read_block(lba, block_buf)?;
        }

        buf.copy_from_slice(&temp[block_offset..block_offset + len]);

        Ok(len)
    }

    /// 写入字节
    ///
    /// 向任意字节偏移写入；非块对齐时先读出所在块再合并。
    pub fn write_bytes(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        let len = buf.len();
        let block_size = self.block_size() as u64;

        let start_block = offset / block_size;
        let block_offset = (offset % block_size) as usize;

        let total_size = block_offset + len;
        let block_count = (total_size as u64).div_ceil(block_size) as usize;

        let mut temp = vec![0u8; block_count * block_size as usize];

        if block_offset != 0 || len % block_size as usize != 0 {
            for i in 0..block_count {
                let lba = start_block + i as u64;
                let block_buf =
                    &mut temp[i * block_size as usize..(i + 1) * block_size as usize];
                self.read_block(lba, block_buf)?;
            }
        }

        temp[block_offset..block_offset + len].copy_from_slice(buf);

        for i in 0..block_count {
            let lba = start_block + i as u64;
            let block_buf = &temp[i * block_size as usize..(i + 1) * block_size as usize];
            self.write_block(lba, block_buf)?;
        }

        Ok(len)
    }

    /// 刷新
    ///
    /// 两层刷新：先把缓存中的脏块写回设备，再调用设备的 flush。
    /// 只有本函数成功返回后，之前的写入才算持久化。
    pub fn flush(&mut self) -> Result<()> {
        self.write_back_cache()?;
        self.inc_flush_count();
        self.device_mut().flush()
    }

    /// 把缓存中的脏块写回设备（不调用设备 flush）
    fn write_back_cache(&mut self) -> Result<usize> {
        // 临时取出缓存以避免借用冲突
        let Some(mut cache) = self.bcache.take() else {
            return Ok(0);
        };
        let result = cache.flush_all(|lba, data| self.device_write_block(lba, data));
        self.bcache = Some(cache);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{DeviceOp, MemDevice};

    #[test]
    fn test_read_write_bytes_unaligned() {
        let mut bdev = BlockDev::new(MemDevice::new(1024, 64)).unwrap();

        bdev.write_bytes(1000, b"hello, journal").unwrap();

        let mut buf = [0u8; 14];
        bdev.read_bytes(1000, &mut buf).unwrap();
        assert_eq!(&buf, b"hello, journal");
    }

    #[test]
    fn test_cached_write_not_durable_until_flush() {
        let mut bdev = BlockDev::new_with_cache(MemDevice::new(1024, 64), 8).unwrap();

        bdev.write_block(3, &[0xAB; 1024]).unwrap();
        assert_eq!(bdev.physical_write_count(), 0);
        assert_eq!(bdev.dirty_blocks(), 1);
        assert_eq!(bdev.device().durable_block(3)[0], 0);

        bdev.flush().unwrap();
        assert_eq!(bdev.dirty_blocks(), 0);
        assert_eq!(bdev.device().durable_block(3)[0], 0xAB);

        // 设备 flush 一定在块写入之后
        let ops = bdev.device().ops();
        assert_eq!(ops.last(), Some(&DeviceOp::Flush));
    }

    #[test]
    fn test_cache_hit_skips_device_read() {
        let mut bdev = BlockDev::new_with_cache(MemDevice::new(1024, 64), 8).unwrap();
        let mut buf = [0u8; 1024];

        bdev.read_block(5, &mut buf).unwrap();
        bdev.read_block(5, &mut buf).unwrap();

        assert_eq!(bdev.read_count(), 2);
        assert_eq!(bdev.physical_read_count(), 1);
    }

    #[test]
    fn test_full_dirty_cache_writes_back() {
        let mut bdev = BlockDev::new_with_cache(MemDevice::new(1024, 64), 2).unwrap();

        for lba in 0..4u64 {
            bdev.write_block(lba, &[lba as u8 + 1; 1024]).unwrap();
        }

        // 至少前两块已被迫写回
        assert!(bdev.physical_write_count() >= 2);
        bdev.flush().unwrap();
        for lba in 0..4u64 {
            assert_eq!(bdev.device().durable_block(lba)[0], lba as u8 + 1);
        }
    }

    #[test]
    fn test_write_to_read_only_device_fails() {
        let mut bdev = BlockDev::new(MemDevice::new(1024, 16).read_only()).unwrap();
        let err = bdev.write_block(1, &[0u8; 1024]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
        assert!(bdev.device().ops().is_empty());
    }

    #[test]
    fn test_out_of_range_block_rejected() {
        let mut bdev = BlockDev::new(MemDevice::new(1024, 16)).unwrap();
        let mut buf = [0u8; 1024];
        assert!(bdev.read_block(16, &mut buf).is_err());
        assert!(bdev.write_block(99, &buf).is_err());
    }
}
