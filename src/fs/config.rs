//! 挂载配置与卷状态标志

use crate::consts::CONFIG_BLOCK_DEV_CACHE_SIZE;
use crate::recover::RefreshPolicy;
use bitflags::bitflags;

/// 日志恢复失败时挂载流程的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryFailureAction {
    /// 挂载失败
    #[default]
    Abort,
    /// 以只读、降级方式继续挂载
    ReadOnly,
}

/// 挂载配置
#[derive(Debug, Clone, Copy)]
pub struct MountConfig {
    /// 只读挂载
    pub read_only: bool,
    /// 块缓存大小（块数），0 表示不使用缓存
    pub cache_blocks: usize,
    /// 回放后何时重新读取 superblock 和块组描述符
    pub refresh_policy: RefreshPolicy,
    /// 日志恢复失败时的处理
    pub on_recovery_failure: RecoveryFailureAction,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            cache_blocks: CONFIG_BLOCK_DEV_CACHE_SIZE,
            refresh_policy: RefreshPolicy::default(),
            on_recovery_failure: RecoveryFailureAction::default(),
        }
    }
}

impl MountConfig {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }
}

bitflags! {
    /// 卷状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VolumeFlags: u32 {
        /// 卷只读（挂载配置或设备本身）
        const READ_ONLY       = 0x01;
        /// superblock 中设置了 needs_recovery，恢复尚未完成
        const JOURNAL_RECOVER = 0x02;
        /// 恢复失败后降级挂载
        const DEGRADED        = 0x04;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_config_default() {
        let config = MountConfig::default();
        assert!(!config.read_only);
        assert_eq!(config.cache_blocks, 256);
        assert_eq!(config.refresh_policy, RefreshPolicy::Always);
        assert_eq!(config.on_recovery_failure, RecoveryFailureAction::Abort);
        assert!(MountConfig::read_only().read_only);
    }
}
