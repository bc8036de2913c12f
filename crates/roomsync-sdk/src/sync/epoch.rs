//! 同步纪元守卫 - 远端数据集身份变化的检测与处置
//!
//! 远端的 session UUID 是「这一代远端数据」的不透明令牌（epoch）。
//! 令牌变化意味着后端存储被重建（如服务重启），本地积累的消息/参与者
//! 已经指向一个不存在的数据集，唯一正确的处置是全量丢弃并归零水位线。
//! 这是有意的破坏性重置：远端是唯一权威，未被确认的本地编辑随之丢失。
//!
//! 守卫同时持有水位线（watermark）：本地状态已知与远端一致的时间点。
//! 两者都不落盘（见 `storage::snapshot`），冷启动统一走全量 bootstrap。

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::storage::entities::ServerInfo;
use crate::storage::ChatStore;

/// `apply_remote` 的处置结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpochOutcome {
    /// 首次建立 epoch（正常 bootstrap，不是重置）
    Adopted,
    /// 令牌未变，仅刷新协议版本
    Unchanged,
    /// 令牌变化：已清空实体存储并归零水位线
    Rotated { old_epoch: String },
}

#[derive(Debug, Default)]
struct GuardState {
    epoch: Option<String>,
    api_version: u32,
    /// 本地状态已同步到的 UTC 毫秒时间点；只在 epoch 轮转时归零
    watermark: i64,
}

/// 同步纪元守卫
pub struct EpochGuard {
    state: RwLock<GuardState>,
}

impl EpochGuard {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GuardState::default()),
        }
    }

    /// 是否已建立 epoch（bootstrap 是否完成过）
    pub async fn has_epoch(&self) -> bool {
        self.state.read().await.epoch.is_some()
    }

    pub async fn epoch(&self) -> Option<String> {
        self.state.read().await.epoch.clone()
    }

    pub async fn api_version(&self) -> u32 {
        self.state.read().await.api_version
    }

    pub async fn watermark(&self) -> i64 {
        self.state.read().await.watermark
    }

    /// 处理远端返回的 epoch 信息
    ///
    /// 每个同步周期在拉取增量之前都必须调用，不只是 bootstrap：
    /// 远端随时可能轮转。
    pub async fn apply_remote(&self, info: &ServerInfo, store: &ChatStore) -> EpochOutcome {
        let outcome = {
            let mut state = self.state.write().await;
            match &state.epoch {
                None => {
                    info!("采用初始 epoch: {} (api v{})", info.session_uuid, info.api_version);
                    state.epoch = Some(info.session_uuid.clone());
                    state.api_version = info.api_version;
                    EpochOutcome::Adopted
                }
                Some(held) if *held == info.session_uuid => {
                    if state.api_version != info.api_version {
                        debug!(
                            "协议版本刷新: v{} -> v{}",
                            state.api_version, info.api_version
                        );
                        state.api_version = info.api_version;
                    }
                    EpochOutcome::Unchanged
                }
                Some(held) => {
                    warn!(
                        "检测到 epoch 轮转: {} -> {}，重置本地数据",
                        held, info.session_uuid
                    );
                    let old_epoch = held.clone();
                    state.epoch = Some(info.session_uuid.clone());
                    state.api_version = info.api_version;
                    state.watermark = 0;
                    EpochOutcome::Rotated { old_epoch }
                }
            }
        };

        // 轮转时清空实体存储（锁已释放，清空经由存储自己的变更入口）
        if matches!(outcome, EpochOutcome::Rotated { .. }) {
            store.clear_entities().await;
        }

        outcome
    }

    /// 推进水位线（单调：低于当前值的输入被忽略），返回推进后的值
    pub async fn advance_watermark(&self, candidate: i64) -> i64 {
        let mut state = self.state.write().await;
        if candidate > state.watermark {
            state.watermark = candidate;
        }
        state.watermark
    }
}

impl Default for EpochGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entities::Message;

    fn info(uuid: &str, version: u32) -> ServerInfo {
        ServerInfo {
            session_uuid: uuid.to_string(),
            api_version: version,
        }
    }

    fn message(uuid: &str, sent_at: i64) -> Message {
        Message {
            uuid: uuid.to_string(),
            author_uuid: "p1".to_string(),
            text: "x".to_string(),
            sent_at,
            updated_at: sent_at,
            attachments: Vec::new(),
            reactions: Vec::new(),
            reply_to_message_uuid: None,
        }
    }

    #[tokio::test]
    async fn test_first_apply_adopts_without_reset() {
        let guard = EpochGuard::new();
        let store = ChatStore::in_memory();
        store.upsert_message(message("m1", 100)).await;

        let outcome = guard.apply_remote(&info("E1", 1), &store).await;
        assert_eq!(outcome, EpochOutcome::Adopted);
        // 首次采用不是重置：已有数据保留
        assert_eq!(store.message_count().await, 1);
        assert_eq!(guard.epoch().await.unwrap(), "E1");
        assert_eq!(guard.api_version().await, 1);
    }

    #[tokio::test]
    async fn test_same_epoch_refreshes_version_only() {
        let guard = EpochGuard::new();
        let store = ChatStore::in_memory();
        guard.apply_remote(&info("E1", 1), &store).await;
        store.upsert_message(message("m1", 100)).await;
        guard.advance_watermark(500).await;

        let outcome = guard.apply_remote(&info("E1", 2), &store).await;
        assert_eq!(outcome, EpochOutcome::Unchanged);
        assert_eq!(store.message_count().await, 1);
        assert_eq!(guard.watermark().await, 500);
        assert_eq!(guard.api_version().await, 2);
    }

    #[tokio::test]
    async fn test_rotation_resets_everything() {
        // 持有 E1 与若干数据，收到 E2：消息/参与者清零、水位线归零
        let guard = EpochGuard::new();
        let store = ChatStore::in_memory();
        guard.apply_remote(&info("E1", 1), &store).await;
        store
            .upsert_messages(vec![message("m1", 100), message("m2", 200)])
            .await;
        guard.advance_watermark(500).await;

        let outcome = guard.apply_remote(&info("E2", 1), &store).await;
        assert_eq!(
            outcome,
            EpochOutcome::Rotated {
                old_epoch: "E1".to_string()
            }
        );
        assert_eq!(store.message_count().await, 0);
        assert_eq!(store.participant_count().await, 0);
        assert_eq!(guard.watermark().await, 0);
        assert_eq!(guard.epoch().await.unwrap(), "E2");
    }

    #[tokio::test]
    async fn test_watermark_is_monotonic() {
        let guard = EpochGuard::new();
        assert_eq!(guard.advance_watermark(100).await, 100);
        // 回退输入被忽略
        assert_eq!(guard.advance_watermark(50).await, 100);
        assert_eq!(guard.advance_watermark(200).await, 200);
        assert_eq!(guard.watermark().await, 200);
    }
}
