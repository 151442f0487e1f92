//! 卷实例
//!
//! 每次挂载尝试创建一个 [`Volume`]。所有对块设备、superblock 与块组
//! 描述符的访问都要先拿到卷级排他锁。

use super::config::{MountConfig, RecoveryFailureAction, VolumeFlags};
use crate::{
    block::{BlockDev, BlockDevice},
    block_group::{self, BlockGroup},
    consts::EXT4_FEATURE_INCOMPAT_JOURNAL_DEV,
    error::{Error, ErrorKind, Result},
    recover,
    superblock::Superblock,
};
use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

/// 锁内的卷状态
pub struct VolumeState<D> {
    bdev: BlockDev<D>,
    sb: Superblock,
    groups: Vec<BlockGroup>,
    flags: VolumeFlags,
    config: MountConfig,
}

impl<D: BlockDevice> VolumeState<D> {
    /// 当前 superblock 映像
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub fn superblock_mut(&mut self) -> &mut Superblock {
        &mut self.sb
    }

    /// 缓存的块组描述符
    pub fn groups(&self) -> &[BlockGroup] {
        &self.groups
    }

    pub fn flags(&self) -> VolumeFlags {
        self.flags
    }

    pub fn insert_flags(&mut self, flags: VolumeFlags) {
        self.flags.insert(flags);
    }

    pub fn remove_flags(&mut self, flags: VolumeFlags) {
        self.flags.remove(flags);
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(VolumeFlags::READ_ONLY)
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn block_device(&self) -> &BlockDev<D> {
        &self.bdev
    }

    pub fn block_device_mut(&mut self) -> &mut BlockDev<D> {
        &mut self.bdev
    }

    /// 同时借出块设备和 superblock
    pub fn io_parts(&mut self) -> (&mut BlockDev<D>, &Superblock) {
        (&mut self.bdev, &self.sb)
    }

    /// 从磁盘重新读取 superblock，失败时保留当前映像
    pub fn refresh_superblock(&mut self) -> Result<()> {
        self.sb = Superblock::load(&mut self.bdev)?;
        log::debug!("[VOLUME] superblock reloaded");
        Ok(())
    }

    /// 重新读取全部块组描述符
    pub fn refresh_groups(&mut self) -> Result<()> {
        self.groups = block_group::load_all(&mut self.bdev, &self.sb)?;
        log::debug!("[VOLUME] {} group descriptors reloaded", self.groups.len());
        Ok(())
    }

    /// 写回 superblock（写入缓存，`sync` 后才持久）
    pub fn save_superblock(&mut self) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::new(ErrorKind::ReadOnly, "volume is read-only"));
        }
        self.sb.write(&mut self.bdev)
    }

    /// 刷新块设备
    pub fn sync(&mut self) -> Result<()> {
        self.bdev.flush()
    }

    /// 取出块设备（不会自动刷新）
    pub fn into_block_device(self) -> BlockDev<D> {
        self.bdev
    }
}

/// 一次挂载尝试对应的卷
pub struct Volume<D> {
    state: Mutex<VolumeState<D>>,
}

impl<D: BlockDevice> Volume<D> {
    /// 打开卷：读取 superblock 和块组描述符，不做日志恢复
    pub fn open(device: D, config: MountConfig) -> Result<Self> {
        let mut bdev = BlockDev::new_with_cache(device, config.cache_blocks)?;
        let sb = Superblock::load(&mut bdev)?;
        if sb.has_incompat_feature(EXT4_FEATURE_INCOMPAT_JOURNAL_DEV) {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "device is an external journal, not a filesystem",
            ));
        }
        if bdev.block_size() != sb.block_size() {
            log::error!(
                "[VOLUME] device block size {} does not match filesystem block size {}",
                bdev.block_size(),
                sb.block_size()
            );
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "device block size does not match filesystem block size",
            ));
        }
        let groups = block_group::load_all(&mut bdev, &sb)?;

        let mut flags = VolumeFlags::empty();
        if config.read_only || bdev.is_read_only() {
            flags |= VolumeFlags::READ_ONLY;
        }

        log::info!(
            "[VOLUME] opened: {} blocks of {} bytes, {} groups, flags {:?}",
            sb.blocks_count(),
            sb.block_size(),
            groups.len(),
            flags
        );

        Ok(Self {
            state: Mutex::new(VolumeState {
                bdev,
                sb,
                groups,
                flags,
                config,
            }),
        })
    }

    /// 打开卷并执行日志恢复
    ///
    /// 恢复失败时按 `config.on_recovery_failure` 处理：`Abort` 返回错误，
    /// `ReadOnly` 把卷标记为只读并降级后继续。
    pub fn mount(device: D, config: MountConfig) -> Result<Self> {
        let volume = Self::open(device, config)?;
        let status = recover::recover_journal(&volume);

        if let Some(err) = status.error() {
            match config.on_recovery_failure {
                RecoveryFailureAction::Abort => {
                    log::error!("[VOLUME] mount aborted: {:?}", status);
                    return Err(err.clone());
                }
                RecoveryFailureAction::ReadOnly => {
                    log::warn!(
                        "[VOLUME] journal recovery failed ({:?}), continuing read-only",
                        status
                    );
                    volume
                        .lock()
                        .insert_flags(VolumeFlags::READ_ONLY | VolumeFlags::DEGRADED);
                }
            }
        }

        Ok(volume)
    }

    /// 获取卷级排他锁（自旋等待）
    pub fn lock(&self) -> MutexGuard<'_, VolumeState<D>> {
        self.state.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, VolumeState<D>>> {
        self.state.try_lock()
    }

    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }

    pub fn flags(&self) -> VolumeFlags {
        self.lock().flags()
    }

    pub fn into_state(self) -> VolumeState<D> {
        self.state.into_inner()
    }
}
