//! 事件系统模块 - 同步引擎对外的观察通道
//!
//! UI 协作方只读取同步后的状态、调用变更操作；事件系统让它在不轮询
//! 存储的情况下得知「什么变了」。
//!
//! 事件类型：
//! - 实体变更（消息/参与者批量 upsert、epoch 轮转引发的清空）
//! - 同步周期结果（成功推进水位线 / 失败保持原位）
//! - 乐观发送生命周期（确认 / 失败）

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// SDK 事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SdkEvent {
    /// 一批消息被写入存储
    MessagesUpserted { count: usize, timestamp: i64 },
    /// 一批参与者被写入存储
    ParticipantsUpserted { count: usize, timestamp: i64 },
    /// epoch 轮转导致本地状态清空
    StoreReset {
        old_epoch: Option<String>,
        new_epoch: String,
        timestamp: i64,
    },
    /// 一次同步周期成功完成，水位线推进
    SyncCompleted { watermark: i64 },
    /// 同步周期失败，水位线保持不变
    SyncFailed { error: String, timestamp: i64 },
    /// 乐观发送已确认：本地临时记录被服务端权威记录原位替换
    MessageSent {
        provisional_uuid: String,
        server_uuid: String,
        timestamp: i64,
    },
    /// 乐观发送失败：本地临时记录保留，等待重试
    MessageSendFailed {
        provisional_uuid: String,
        error: String,
        timestamp: i64,
    },
}

impl SdkEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SdkEvent::MessagesUpserted { .. } => "messages_upserted",
            SdkEvent::ParticipantsUpserted { .. } => "participants_upserted",
            SdkEvent::StoreReset { .. } => "store_reset",
            SdkEvent::SyncCompleted { .. } => "sync_completed",
            SdkEvent::SyncFailed { .. } => "sync_failed",
            SdkEvent::MessageSent { .. } => "message_sent",
            SdkEvent::MessageSendFailed { .. } => "message_send_failed",
        }
    }
}

/// 事件管理器 - 基于 tokio broadcast 的发布/订阅
pub struct EventManager {
    sender: broadcast::Sender<SdkEvent>,
}

impl EventManager {
    /// 创建新的事件管理器
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件
    ///
    /// 无订阅者时 send 会失败，属正常场景（如无 UI 的压测客户端），仅打 debug。
    pub fn emit(&self, event: SdkEvent) {
        debug!("Emitting event: {}", event.event_type());
        if let Err(e) = self.sender.send(event) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.sender.subscribe()
    }

    /// 获取活跃订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
