//! 块设备抽象
//!
//! 提供块设备接口和块级 I/O 操作。
//! block/device.rs 定义设备 trait 和 BlockDev 包装器（统计信息、可选缓存）
//! block/io.rs 提供块/字节粒度的读写和两级刷新：先写回缓存中的脏块，再调用设备 flush
//! block/mem.rs 提供内存块设备，区分"已写入"和"已持久化"两种状态

mod device;
mod io;
mod mem;

pub use device::{BlockDevice, BlockDev};
pub use mem::{DeviceOp, MemDevice};
