//! 增量同步模块
//!
//! 职责：
//! - 检测远端数据集重建（epoch 轮转）并触发本地重置（`epoch`）
//! - 周期性拉取增量并写入实体存储（`poller`）
//! - 乐观发送与权威记录的对账（`sender`）
//!
//! 引擎内部不做重试/退避：失败被吸收为存储上的错误字段，
//! 下一个自然周期（下一个 tick、用户重新 bootstrap）重新尝试。

pub mod epoch;
pub mod poller;
pub mod sender;

pub use epoch::{EpochGuard, EpochOutcome};
pub use poller::{SyncPoller, TickOutcome};
pub use sender::{PendingSend, PendingSendState, SendCoordinator};
