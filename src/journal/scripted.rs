//! 脚本化回放引擎
//!
//! 不读取真实日志，按预设结果模拟成功、瞬时 I/O 失败或日志损坏，
//! 并记录每次调用，用于检查恢复控制器的调用顺序与资源释放。

use super::{JournalError, ReplayEngine};
use crate::{
    block::{BlockDev, BlockDevice},
    error::{Error, Result},
    inode::Inode,
    superblock::Superblock,
};
use alloc::vec;
use alloc::vec::Vec;

/// 预设的调用结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptedOutcome {
    #[default]
    Ok,
    /// I/O 错误
    TransientFailure,
    /// 日志损坏
    Malformed,
}

impl ScriptedOutcome {
    fn into_result(self) -> Result<()> {
        match self {
            ScriptedOutcome::Ok => Ok(()),
            ScriptedOutcome::TransientFailure => Err(Error::from(JournalError::IoError)),
            ScriptedOutcome::Malformed => Err(Error::from(JournalError::MalformedBlock)),
        }
    }
}

/// 脚本化引擎的句柄
#[derive(Debug, PartialEq, Eq)]
pub struct ScriptedHandle {
    id: u32,
    inode_num: u32,
}

impl ScriptedHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 建立句柄时使用的 journal inode 号
    pub fn inode_num(&self) -> u32 {
        self.inode_num
    }
}

/// 脚本化回放引擎
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    init_outcome: ScriptedOutcome,
    load_outcome: ScriptedOutcome,
    wipe_outcome: ScriptedOutcome,
    /// load 成功时写入设备的块：(块号, 填充字节)
    replay_writes: Vec<(u64, u8)>,

    init_calls: u32,
    load_calls: u32,
    wipe_calls: Vec<bool>,
    destroy_calls: u32,
    next_id: u32,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_outcome(mut self, outcome: ScriptedOutcome) -> Self {
        self.init_outcome = outcome;
        self
    }

    pub fn load_outcome(mut self, outcome: ScriptedOutcome) -> Self {
        self.load_outcome = outcome;
        self
    }

    pub fn wipe_outcome(mut self, outcome: ScriptedOutcome) -> Self {
        self.wipe_outcome = outcome;
        self
    }

    /// load 成功时把 `lba` 整块填充为 `fill`
    pub fn replay_write(mut self, lba: u64, fill: u8) -> Self {
        self.replay_writes.push((lba, fill));
        self
    }

    pub fn init_calls(&self) -> u32 {
        self.init_calls
    }

    pub fn load_calls(&self) -> u32 {
        self.load_calls
    }

    /// 每次 wipe 调用的 `writable` 参数
    pub fn wipe_calls(&self) -> &[bool] {
        &self.wipe_calls
    }

    pub fn destroy_calls(&self) -> u32 {
        self.destroy_calls
    }

    /// 已创建但尚未销毁的句柄数
    pub fn live_handles(&self) -> u32 {
        self.next_id - self.destroy_calls
    }
}

impl<D: BlockDevice> ReplayEngine<D> for ScriptedEngine {
    type Handle = ScriptedHandle;

    fn init(
        &mut self,
        _bdev: &mut BlockDev<D>,
        _superblock: &Superblock,
        inode: &Inode,
    ) -> Result<ScriptedHandle> {
        self.init_calls += 1;
        self.init_outcome.into_result()?;
        self.next_id += 1;
        Ok(ScriptedHandle {
            id: self.next_id,
            inode_num: inode.inode_num(),
        })
    }

    fn load(
        &mut self,
        _handle: &mut ScriptedHandle,
        bdev: &mut BlockDev<D>,
        _superblock: &Superblock,
    ) -> Result<()> {
        self.load_calls += 1;
        self.load_outcome.into_result()?;

        let mut buf = vec![0u8; bdev.block_size() as usize];
        for &(lba, fill) in &self.replay_writes {
            buf.fill(fill);
            bdev.write_block(lba, &buf)?;
        }
        Ok(())
    }

    fn wipe(
        &mut self,
        _handle: &mut ScriptedHandle,
        _bdev: &mut BlockDev<D>,
        _superblock: &Superblock,
        writable: bool,
    ) -> Result<()> {
        self.wipe_calls.push(writable);
        self.wipe_outcome.into_result()
    }

    fn destroy(&mut self, _handle: ScriptedHandle) {
        self.destroy_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;
    use crate::error::ErrorKind;
    use crate::test_utils::ImageBuilder;

    #[test]
    fn test_scripted_calls_are_counted() {
        let (mut bdev, sb) = ImageBuilder::new().build_volume();
        let inode = Inode::load(&mut bdev, &sb, 8).unwrap();
        let mut engine = ScriptedEngine::new().replay_write(120, 0x5C);

        let mut handle = ReplayEngine::<MemDevice>::init(&mut engine, &mut bdev, &sb, &inode).unwrap();
        assert_eq!(handle.inode_num(), 8);
        assert_eq!(engine.live_handles(), 1);

        engine.load(&mut handle, &mut bdev, &sb).unwrap();
        engine.wipe(&mut handle, &mut bdev, &sb, false).unwrap();
        ReplayEngine::<MemDevice>::destroy(&mut engine, handle);

        assert_eq!(engine.load_calls(), 1);
        assert_eq!(engine.wipe_calls(), &[false]);
        assert_eq!(engine.live_handles(), 0);
        assert!(bdev.device().block(120).iter().all(|&b| b == 0x5C));
    }

    #[test]
    fn test_scripted_failures() {
        let (mut bdev, sb) = ImageBuilder::new().build_volume();
        let inode = Inode::load(&mut bdev, &sb, 8).unwrap();

        let mut engine = ScriptedEngine::new().init_outcome(ScriptedOutcome::TransientFailure);
        let err = ReplayEngine::<MemDevice>::init(&mut engine, &mut bdev, &sb, &inode).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(engine.live_handles(), 0);

        let mut engine = ScriptedEngine::new().load_outcome(ScriptedOutcome::Malformed);
        let mut handle = ReplayEngine::<MemDevice>::init(&mut engine, &mut bdev, &sb, &inode).unwrap();
        let err = engine.load(&mut handle, &mut bdev, &sb).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        ReplayEngine::<MemDevice>::destroy(&mut engine, handle);
    }
}
