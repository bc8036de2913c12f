//! 持久化快照 - 实体状态的落盘投影
//!
//! 快照只包含 `{messages, participants}`，写在命名空间 Tree 下的单个键上。
//! watermark 与 epoch 有意不落盘：进程重启后冷启动必须执行一次全量
//! bootstrap 重新推导（重启后使用过期水位线会造成不可恢复的数据缺口）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::entities::{Message, Participant};
use crate::storage::kv::KvStore;

const SNAPSHOT_KEY: &str = "chat_snapshot";

/// 快照记录 - 可重启存活的实体子集
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub participants: Vec<Participant>,
}

/// 快照存取器
#[derive(Clone)]
pub struct SnapshotStore {
    kv: Arc<KvStore>,
}

impl SnapshotStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    /// 读取快照（不存在时返回 None）
    pub fn load(&self) -> Result<Option<ChatSnapshot>> {
        self.kv.get(SNAPSHOT_KEY)
    }

    /// 写入快照（整条覆盖）
    pub fn store(&self, snapshot: &ChatSnapshot) -> Result<()> {
        self.kv.set(SNAPSHOT_KEY, snapshot)
    }
}
