//! 乐观发送协调器 - 本地先行插入，随后与服务端权威记录对账
//!
//! 发送流程：本地立刻合成一条 `local-` 前缀 ID 的临时消息写入存储
//! （发送者即时看到反馈），同时在 pending 表登记；推送成功后用服务端
//! 权威记录**原位替换**临时记录：两个 ID 由 pending 表关联，存储里
//! 不会出现同一条消息的两份记录。
//!
//! 本地临时 ID 只是传输期标识：不落入服务端、不跨端同步、不被业务
//! 逻辑依赖；快照里短暂出现的临时记录会在下一次 bootstrap 被全量
//! 覆盖掉。
//!
//! 失败时临时记录保留（不回滚，避免「消息闪没」），pending 条目转为
//! Failed 供 UI 区分展示，可经 `retry` 重新推送。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, RoomSyncError};
use crate::events::{EventManager, SdkEvent};
use crate::gateway::ChatGateway;
use crate::storage::entities::{Message, LOCAL_MESSAGE_PREFIX};
use crate::storage::ChatStore;
use crate::utils::now_millis;

/// pending 条目的发送状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingSendState {
    /// 已推送，等待服务端响应
    Sending,
    /// 推送失败，临时记录仍在存储中，可重试
    Failed { error: String },
}

/// 一次在途的乐观发送
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub provisional_uuid: String,
    /// 去除首尾空白后的正文（重试时重新推送的内容）
    pub text: String,
    pub state: PendingSendState,
    pub created_at: i64,
}

/// 乐观发送协调器
pub struct SendCoordinator {
    store: Arc<ChatStore>,
    gateway: Arc<dyn ChatGateway>,
    events: Arc<EventManager>,
    /// 本地参与者 ID（临时消息的作者）
    local_user_uuid: String,
    /// provisional_uuid -> 在途发送；关联临时 ID 与权威 ID 的唯一依据
    pending: Mutex<HashMap<String, PendingSend>>,
}

impl SendCoordinator {
    pub fn new(
        store: Arc<ChatStore>,
        gateway: Arc<dyn ChatGateway>,
        events: Arc<EventManager>,
        local_user_uuid: String,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            local_user_uuid,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// 发送一条消息
    ///
    /// 空白输入静默忽略（返回 `Ok(None)`，不产生记录、不发网络请求）。
    /// 成功时返回服务端权威记录；失败时返回错误，临时记录保留在存储中。
    pub async fn send(&self, text: &str) -> Result<Option<Message>> {
        // 1. 去空白；为空不是错误，直接无操作
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("忽略空白消息输入");
            return Ok(None);
        }

        // 2. 合成本地临时消息：local- 命名空间 ID，作者为本地参与者
        let provisional_uuid = format!("{}{}", LOCAL_MESSAGE_PREFIX, Uuid::new_v4());
        let now = now_millis();
        let provisional = Message {
            uuid: provisional_uuid.clone(),
            author_uuid: self.local_user_uuid.clone(),
            text: trimmed.to_string(),
            sent_at: now,
            updated_at: now,
            attachments: Vec::new(),
            reactions: Vec::new(),
            reply_to_message_uuid: None,
        };

        // 3. 立即写入存储（乐观半程）并登记 pending
        self.store.upsert_message(provisional).await;
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                provisional_uuid.clone(),
                PendingSend {
                    provisional_uuid: provisional_uuid.clone(),
                    text: trimmed.to_string(),
                    state: PendingSendState::Sending,
                    created_at: now,
                },
            );
        }

        // 4-6. 推送远端并对账
        self.push_and_reconcile(&provisional_uuid, trimmed)
            .await
            .map(Some)
    }

    /// 重试一条失败的发送
    ///
    /// 只接受 pending 表中处于 Failed 状态的条目。
    pub async fn retry(&self, provisional_uuid: &str) -> Result<Message> {
        let text = {
            let mut pending = self.pending.lock().await;
            let entry = pending.get_mut(provisional_uuid).ok_or_else(|| {
                RoomSyncError::InvalidInput(format!("未知的在途发送: {}", provisional_uuid))
            })?;
            if !matches!(entry.state, PendingSendState::Failed { .. }) {
                return Err(RoomSyncError::InvalidInput(format!(
                    "在途发送不处于失败状态: {}",
                    provisional_uuid
                )));
            }
            entry.state = PendingSendState::Sending;
            entry.text.clone()
        };

        self.push_and_reconcile(provisional_uuid, &text).await
    }

    /// 当前在途/失败的发送列表（供 UI 区分展示临时消息）
    pub async fn pending_sends(&self) -> Vec<PendingSend> {
        self.pending.lock().await.values().cloned().collect()
    }

    /// 推送远端；成功则原位替换临时记录，失败则标记 pending
    async fn push_and_reconcile(&self, provisional_uuid: &str, text: &str) -> Result<Message> {
        match self.gateway.post_new_message(text).await {
            Ok(authoritative) => {
                // 5. 对账：临时记录退役，权威记录写入（同一把写锁入口，
                //    不会出现两份记录同时可见的稳定状态）
                self.store.remove_message(provisional_uuid).await;
                self.store.upsert_message(authoritative.clone()).await;
                self.pending.lock().await.remove(provisional_uuid);

                info!(
                    "✅ 消息发送成功: {} -> {}",
                    provisional_uuid, authoritative.uuid
                );
                self.events.emit(SdkEvent::MessageSent {
                    provisional_uuid: provisional_uuid.to_string(),
                    server_uuid: authoritative.uuid.clone(),
                    timestamp: now_millis(),
                });
                Ok(authoritative)
            }
            Err(e) => {
                // 6. 失败：临时记录保留，pending 转 Failed，错误面向 UI
                let error = format!("发送消息失败: {}", e);
                warn!("{}", error);
                if let Some(entry) = self.pending.lock().await.get_mut(provisional_uuid) {
                    entry.state = PendingSendState::Failed {
                        error: error.clone(),
                    };
                }
                self.store.set_error(Some(error.clone())).await;
                self.events.emit(SdkEvent::MessageSendFailed {
                    provisional_uuid: provisional_uuid.to_string(),
                    error,
                    timestamp: now_millis(),
                });
                Err(e)
            }
        }
    }
}
