//! 错误类型定义
//!
//! 提供日志恢复及其依赖的块设备、superblock、inode 操作的错误类型。

use core::fmt;

use crate::consts::*;

/// 恢复流程中的操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误
    Io,
    /// 无效参数
    InvalidInput,
    /// 文件系统损坏
    Corrupted,
    /// 权限错误
    PermissionDenied,
    /// 对象不存在
    NotFound,
    /// 空间不足
    NoSpace,
    /// 不支持的操作或特性
    Unsupported,
    /// 设备忙
    Busy,
    /// 无效状态
    InvalidState,
    /// 卷或设备只读
    ReadOnly,
}

impl ErrorKind {
    /// 对应的 POSIX errno（正值）
    pub const fn errno(self) -> i32 {
        match self {
            ErrorKind::Io => EIO,
            ErrorKind::InvalidInput => EINVAL,
            ErrorKind::Corrupted => EUCLEAN,
            ErrorKind::PermissionDenied => EACCES,
            ErrorKind::NotFound => ENOENT,
            ErrorKind::NoSpace => ENOSPC,
            ErrorKind::Unsupported => ENOTSUP,
            ErrorKind::Busy => EBUSY,
            ErrorKind::InvalidState => EINVAL,
            ErrorKind::ReadOnly => EROFS,
        }
    }
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 以负 errno 形式返回错误码（内核风格）
    pub const fn errno(&self) -> i32 {
        -self.kind.errno()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

// Journal error conversion
impl From<crate::journal::JournalError> for Error {
    fn from(err: crate::journal::JournalError) -> Self {
        use crate::journal::JournalError;
        match err {
            JournalError::NoJournalInode => Error::new(ErrorKind::NotFound, "Journal inode not found"),
            JournalError::InvalidSuperblock => Error::new(ErrorKind::Corrupted, "Invalid journal superblock"),
            JournalError::UnsupportedFeature(_) => Error::new(ErrorKind::Unsupported, "Unsupported journal feature"),
            JournalError::BlockSizeMismatch => Error::new(ErrorKind::Unsupported, "Journal block size differs from filesystem block size"),
            JournalError::MalformedBlock => Error::new(ErrorKind::Corrupted, "Malformed journal block"),
            JournalError::RecoveryFailed => Error::new(ErrorKind::InvalidState, "Journal recovery failed"),
            JournalError::IoError => Error::new(ErrorKind::Io, "Journal I/O error"),
        }
    }
}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
