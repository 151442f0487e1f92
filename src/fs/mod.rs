//! 卷与挂载
//!
//! [`Volume`] 持有块设备、superblock 映像和块组描述符，并用一把
//! 排他锁保护它们；[`Volume::mount`] 在打开卷之后执行日志恢复。

mod config;
mod volume;

pub use config::{MountConfig, RecoveryFailureAction, VolumeFlags};
pub use volume::{Volume, VolumeState};
