//! 挂载时日志恢复控制器
//!
//! 流程：
//!
//! ```text
//! lock ─► 记录 JOURNAL_RECOVER ─► check_journal ─┬─ Skip ─────────────────────┐
//!                                                 ▼                            │
//!                                       InodeLoader::load ── 失败 ─────────────┤
//!                                                 ▼                            │
//!                                       ReplayEngine::init ── 失败 ────────────┤
//!                                                 ▼                            │
//!                               needs_recovery ? load + 持久化 : wipe          │
//!                                                 ▼                            │
//!                                     destroy ─► release inode ─► unlock ◄────┘
//! ```
//!
//! 只有回放成功、superblock 写回并且设备刷新成功之后，内存和磁盘上的
//! needs_recovery 位才一起清除。所有失败都以 [`RecoveryStatus`] 返回，
//! 由调用者决定是否中止挂载。

use crate::{
    block::{BlockDev, BlockDevice},
    error::{Error, Result},
    fs::{Volume, VolumeFlags, VolumeState},
    inode::Inode,
    journal::{Jbd2Engine, ReplayEngine},
    superblock::Superblock,
};

/// 不做日志恢复的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 卷只读
    ReadOnly,
    /// 没有内部 journal inode（外部日志）
    NoJournalInode,
    /// superblock 指向外部日志设备
    ExternalJournalDevice,
}

/// [`check_journal`] 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalCheck {
    Skip(SkipReason),
    /// 使用这个 journal inode 继续
    Proceed(u32),
}

/// 判断是否可以处理日志
///
/// 只依赖 superblock 映像和挂载模式，不做 I/O。
pub fn check_journal(sb: &Superblock, read_only: bool) -> JournalCheck {
    if read_only {
        return JournalCheck::Skip(SkipReason::ReadOnly);
    }
    if sb.journal_inum() == 0 {
        return JournalCheck::Skip(SkipReason::NoJournalInode);
    }
    if sb.journal_dev() != 0 {
        return JournalCheck::Skip(SkipReason::ExternalJournalDevice);
    }
    JournalCheck::Proceed(sb.journal_inum())
}

/// 恢复结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStatus {
    /// 日志已回放，needs_recovery 已清除并落盘
    Replayed,
    /// 日志本来是干净的，已丢弃
    Wiped,
    NotApplicable(SkipReason),
    JournalLoadFailed(Error),
    EngineInitFailed(Error),
    ReplayFailed(Error),
    WipeFailed(Error),
    /// 回放成功，但重新读取或写回元数据失败
    MetadataUpdateFailed(Error),
}

impl RecoveryStatus {
    /// 整数状态码，0 表示成功
    ///
    /// | 状态 | 码 |
    /// |------|----|
    /// | `Replayed` / `Wiped` | 0 |
    /// | `NotApplicable` | -1 |
    /// | `MetadataUpdateFailed` | -5 |
    /// | `JournalLoadFailed` | -6 |
    /// | `EngineInitFailed` | -8 |
    /// | `ReplayFailed` | -9 |
    /// | `WipeFailed` | 引擎错误的 `-errno` |
    ///
    /// `WipeFailed` 的码随错误种类变化：I/O 错误得到 -5（`-EIO`），与
    /// `MetadataUpdateFailed` 相同，其他种类也可能与表中固定的码重合。
    /// 只看整数无法区分这些情况，需要区分时匹配枚举本身。
    pub fn code(&self) -> i32 {
        match self {
            RecoveryStatus::Replayed | RecoveryStatus::Wiped => 0,
            RecoveryStatus::NotApplicable(_) => -1,
            RecoveryStatus::MetadataUpdateFailed(_) => -5,
            RecoveryStatus::JournalLoadFailed(_) => -6,
            RecoveryStatus::EngineInitFailed(_) => -8,
            RecoveryStatus::ReplayFailed(_) => -9,
            RecoveryStatus::WipeFailed(err) => err.errno(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RecoveryStatus::Replayed | RecoveryStatus::Wiped)
    }

    /// 失败时的底层错误；成功和跳过都返回 `None`
    pub fn error(&self) -> Option<&Error> {
        match self {
            RecoveryStatus::JournalLoadFailed(err)
            | RecoveryStatus::EngineInitFailed(err)
            | RecoveryStatus::ReplayFailed(err)
            | RecoveryStatus::WipeFailed(err)
            | RecoveryStatus::MetadataUpdateFailed(err) => Some(err),
            _ => None,
        }
    }
}

/// 回放之后何时重新读取 superblock 和块组描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// 无论回放是否成功都重新读取
    #[default]
    Always,
    /// 只在回放成功后重新读取
    OnSuccess,
}

/// 按 inode 号加载 journal inode
pub trait InodeLoader<D: BlockDevice> {
    fn load(&mut self, bdev: &mut BlockDev<D>, sb: &Superblock, ino: u32) -> Result<Inode>;

    /// 归还 inode，每个加载成功的 inode 恰好归还一次
    fn release(&mut self, _inode: Inode) {}
}

/// 直接从 inode 表读取
#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeInodeLoader;

impl<D: BlockDevice> InodeLoader<D> for VolumeInodeLoader {
    fn load(&mut self, bdev: &mut BlockDev<D>, sb: &Superblock, ino: u32) -> Result<Inode> {
        Inode::load(bdev, sb, ino)
    }
}

/// 日志恢复控制器
///
/// ```rust,ignore
/// let volume = Volume::open(device, MountConfig::default())?;
/// let status = JournalRecovery::new()
///     .refresh_policy(RefreshPolicy::OnSuccess)
///     .run(&volume);
/// ```
pub struct JournalRecovery<L = VolumeInodeLoader, E = Jbd2Engine> {
    loader: L,
    engine: E,
    policy: Option<RefreshPolicy>,
}

impl JournalRecovery {
    pub fn new() -> Self {
        Self::with_parts(VolumeInodeLoader, Jbd2Engine::new())
    }
}

impl Default for JournalRecovery {
    fn default() -> Self {
        Self::new()
    }
}

impl<L, E> JournalRecovery<L, E> {
    pub fn with_parts(loader: L, engine: E) -> Self {
        Self {
            loader,
            engine,
            policy: None,
        }
    }

    /// 覆盖挂载配置中的刷新策略
    pub fn refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// 在卷锁内执行一次恢复
    pub fn run<D>(&mut self, volume: &Volume<D>) -> RecoveryStatus
    where
        D: BlockDevice,
        L: InodeLoader<D>,
        E: ReplayEngine<D>,
    {
        let mut state = volume.lock();
        let status = self.run_locked(&mut state);
        log::info!("[RECOVER] finished: {:?} (code {})", status, status.code());
        status
    }

    fn run_locked<D>(&mut self, state: &mut VolumeState<D>) -> RecoveryStatus
    where
        D: BlockDevice,
        L: InodeLoader<D>,
        E: ReplayEngine<D>,
    {
        if state.superblock().needs_recovery() {
            state.insert_flags(VolumeFlags::JOURNAL_RECOVER);
        }

        let ino = match check_journal(state.superblock(), state.is_read_only()) {
            JournalCheck::Proceed(ino) => ino,
            JournalCheck::Skip(reason) => {
                log::debug!("[RECOVER] journal skipped: {:?}", reason);
                return RecoveryStatus::NotApplicable(reason);
            }
        };

        let (bdev, sb) = state.io_parts();
        let inode = match self.loader.load(bdev, sb, ino) {
            Ok(inode) => inode,
            Err(err) => {
                log::error!("[RECOVER] failed to load journal inode {}: {}", ino, err);
                return RecoveryStatus::JournalLoadFailed(err);
            }
        };

        let mut handle = match self.engine.init(bdev, sb, &inode) {
            Ok(handle) => handle,
            Err(err) => {
                log::error!("[RECOVER] journal init failed: {}", err);
                self.loader.release(inode);
                return RecoveryStatus::EngineInitFailed(err);
            }
        };

        let status = if state.superblock().needs_recovery() {
            self.replay(state, &mut handle)
        } else {
            let writable = !state.is_read_only();
            let (bdev, sb) = state.io_parts();
            match self.engine.wipe(&mut handle, bdev, sb, writable) {
                Ok(()) => RecoveryStatus::Wiped,
                Err(err) => {
                    log::error!("[RECOVER] journal wipe failed: {}", err);
                    RecoveryStatus::WipeFailed(err)
                }
            }
        };

        self.engine.destroy(handle);
        self.loader.release(inode);
        status
    }

    fn replay<D>(
        &mut self,
        state: &mut VolumeState<D>,
        handle: &mut <E as ReplayEngine<D>>::Handle,
    ) -> RecoveryStatus
    where
        D: BlockDevice,
        E: ReplayEngine<D>,
    {
        let policy = self.policy.unwrap_or(state.config().refresh_policy);
        log::info!("[RECOVER] replaying journal (policy {:?})", policy);

        let (bdev, sb) = state.io_parts();
        if let Err(err) = self.engine.load(handle, bdev, sb) {
            log::error!("[RECOVER] journal replay failed: {}", err);
            if policy == RefreshPolicy::Always {
                if let Err(refresh_err) = refresh_metadata(state) {
                    log::warn!("[RECOVER] metadata refresh after failed replay: {}", refresh_err);
                }
            }
            return RecoveryStatus::ReplayFailed(err);
        }

        match persist_recovered(state) {
            Ok(()) => {
                state.remove_flags(VolumeFlags::JOURNAL_RECOVER);
                RecoveryStatus::Replayed
            }
            Err(err) => {
                log::error!("[RECOVER] failed to persist recovered superblock: {}", err);
                RecoveryStatus::MetadataUpdateFailed(err)
            }
        }
    }
}

fn refresh_metadata<D: BlockDevice>(state: &mut VolumeState<D>) -> Result<()> {
    state.refresh_superblock()?;
    state.refresh_groups()
}

/// 清除 needs_recovery、写回并刷新
///
/// 失败时恢复内存中的位，并把恢复后的映像重新写入缓存，
/// 避免已写到设备上的半成品在下一次刷新时落盘。
fn persist_recovered<D: BlockDevice>(state: &mut VolumeState<D>) -> Result<()> {
    refresh_metadata(state)?;

    state.superblock_mut().clear_needs_recovery();
    let result = state.save_superblock().and_then(|()| state.sync());
    if result.is_err() {
        state.superblock_mut().set_needs_recovery();
        if let Err(err) = state.save_superblock() {
            log::warn!("[RECOVER] could not rewrite superblock after failed persist: {}", err);
        }
    }
    result
}

/// 使用默认加载器和 JBD2 引擎恢复卷的日志
pub fn recover_journal<D: BlockDevice>(volume: &Volume<D>) -> RecoveryStatus {
    JournalRecovery::new().run(volume)
}
