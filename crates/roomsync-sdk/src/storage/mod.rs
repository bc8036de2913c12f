//! 存储管理层 - 实体存储与持久化快照
//!
//! 分层：
//! - `entities`: 远端 JSON 对应的实体结构体
//! - `kv`: sled 键值存储（快照落盘载体）
//! - `snapshot`: `{messages, participants}` 投影的存取
//! - `ChatStore`: 客户端权威内存状态，所有变更的唯一入口
//!
//! 不变量（由本层集中保证，调用方不得绕过直接改字段）：
//! - 任意 upsert 序列之后，同一 ID 的消息/参与者至多一条
//! - 消息集合始终按 `sent_at` 升序排列
//! - 每次结构性变更调度一次快照写入（仅 messages/participants）

pub mod entities;
pub mod kv;
pub mod snapshot;

use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::storage::entities::{Message, Participant};
use crate::storage::snapshot::{ChatSnapshot, SnapshotStore};

/// 实体存储内部状态
#[derive(Debug, Default)]
struct StoreState {
    messages: Vec<Message>,
    participants: Vec<Participant>,
    /// 面向 UI 的全局错误信息（网关失败时设置，成功周期清除）
    last_error: Option<String>,
}

/// 实体存储 - 消息与参与者的客户端权威状态
///
/// 进程启动时创建为空，由 bootstrap 填充，随后被增量同步循环与
/// 乐观发送协调器持续变更；仅在 epoch 轮转时被清空。
/// 共享方式为注入 `Arc<ChatStore>`，不存在环境全局变量。
pub struct ChatStore {
    state: RwLock<StoreState>,
    /// 快照存取器；None 表示纯内存模式（测试用）
    snapshots: Option<SnapshotStore>,
}

impl ChatStore {
    pub fn new(snapshots: Option<SnapshotStore>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            snapshots,
        }
    }

    /// 纯内存存储（无持久化），测试与演示用
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// 冷启动时从快照恢复实体状态
    ///
    /// 只恢复 messages/participants；watermark 与 epoch 不在快照内，
    /// 由随后的 bootstrap 重新推导。
    pub async fn hydrate_from_snapshot(&self) -> crate::error::Result<bool> {
        let Some(snapshots) = &self.snapshots else {
            return Ok(false);
        };
        match snapshots.load()? {
            Some(snapshot) => {
                let mut state = self.state.write().await;
                state.messages = snapshot.messages;
                state.messages.sort_by_key(|m| m.sent_at);
                state.participants = snapshot.participants;
                debug!(
                    "快照恢复完成: {} 条消息, {} 个参与者",
                    state.messages.len(),
                    state.participants.len()
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ========== 批量覆盖（仅 bootstrap 使用） ==========

    /// 用新列表整体替换消息集合
    pub async fn replace_all_messages(&self, messages: Vec<Message>) {
        let mut state = self.state.write().await;
        state.messages = messages;
        state.messages.sort_by_key(|m| m.sent_at);
        self.schedule_snapshot(&state);
    }

    /// 用新列表整体替换参与者集合
    pub async fn replace_all_participants(&self, participants: Vec<Participant>) {
        let mut state = self.state.write().await;
        state.participants = participants;
        self.schedule_snapshot(&state);
    }

    // ========== Upsert（按 ID 插入或整体替换） ==========

    /// 批量 upsert 消息
    ///
    /// 已存在同 ID 的记录被输入整体替换（last-write-wins，不做字段级合并），
    /// 否则追加。整批处理完后按 `sent_at` 重新升序排序（上游投递顺序
    /// 不保证按时间排列，所以每批都要重排）。
    pub async fn upsert_messages(&self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        let mut state = self.state.write().await;
        for incoming in messages {
            match state.messages.iter().position(|m| m.uuid == incoming.uuid) {
                Some(index) => state.messages[index] = incoming,
                None => state.messages.push(incoming),
            }
        }
        state.messages.sort_by_key(|m| m.sent_at);
        self.schedule_snapshot(&state);
    }

    /// 单条 upsert 消息（一元素批次）
    pub async fn upsert_message(&self, message: Message) {
        self.upsert_messages(vec![message]).await;
    }

    /// 批量 upsert 参与者
    ///
    /// 同样按 ID 替换或追加；参与者不要求排序（展示顺序是 UI 的事）。
    pub async fn upsert_participants(&self, participants: Vec<Participant>) {
        if participants.is_empty() {
            return;
        }
        let mut state = self.state.write().await;
        for incoming in participants {
            match state
                .participants
                .iter()
                .position(|p| p.uuid == incoming.uuid)
            {
                Some(index) => state.participants[index] = incoming,
                None => state.participants.push(incoming),
            }
        }
        self.schedule_snapshot(&state);
    }

    /// 单个 upsert 参与者（一元素批次）
    pub async fn upsert_participant(&self, participant: Participant) {
        self.upsert_participants(vec![participant]).await;
    }

    // ========== 其他变更 ==========

    /// 按 ID 移除一条消息，返回是否存在
    ///
    /// 发送协调器用它把本地临时记录原位退役，换成服务端权威记录。
    pub async fn remove_message(&self, uuid: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.messages.len();
        state.messages.retain(|m| m.uuid != uuid);
        let removed = state.messages.len() != before;
        if removed {
            self.schedule_snapshot(&state);
        }
        removed
    }

    /// 清空全部实体（仅 epoch 轮转时由守卫调用）
    pub async fn clear_entities(&self) {
        let mut state = self.state.write().await;
        let (m, p) = (state.messages.len(), state.participants.len());
        state.messages.clear();
        state.participants.clear();
        warn!("实体存储已清空: 丢弃 {} 条消息, {} 个参与者", m, p);
        self.schedule_snapshot(&state);
    }

    // ========== 错误字段 ==========

    /// 设置/清除面向 UI 的全局错误信息
    pub async fn set_error(&self, error: Option<String>) {
        let mut state = self.state.write().await;
        state.last_error = error;
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    // ========== 读取 ==========

    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    pub async fn participants(&self) -> Vec<Participant> {
        self.state.read().await.participants.clone()
    }

    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }

    pub async fn participant_count(&self) -> usize {
        self.state.read().await.participants.len()
    }

    /// 按 ID 查找消息
    pub async fn find_message(&self, uuid: &str) -> Option<Message> {
        self.state
            .read()
            .await
            .messages
            .iter()
            .find(|m| m.uuid == uuid)
            .cloned()
    }

    /// 按 ID 查找参与者
    pub async fn find_participant(&self, uuid: &str) -> Option<Participant> {
        self.state
            .read()
            .await
            .participants
            .iter()
            .find(|p| p.uuid == uuid)
            .cloned()
    }

    // ========== 持久化 ==========

    /// 调度一次快照写入（调用方持有写锁，投影在此克隆）
    ///
    /// 写盘放到独立任务里执行，失败只记日志：内存状态仍是权威，
    /// 下一次变更会整条重写。
    fn schedule_snapshot(&self, state: &StoreState) {
        let Some(snapshots) = self.snapshots.clone() else {
            return;
        };
        let snapshot = ChatSnapshot {
            messages: state.messages.clone(),
            participants: state.participants.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = snapshots.store(&snapshot) {
                error!("快照写入失败: {}", e);
            }
        });
    }
}
