//! 增量同步循环 - 周期性拉取远端变化并合入实体存储
//!
//! 调度模型：单个后台任务 + 固定周期定时器（默认 5 秒）。每个 tick
//! 按完整序列跑到结束，tick 之间串行：定时 tick 与手动 `sync_now`
//! 共用一把 tick 锁，交错的 tick 会把水位线推乱。
//!
//! 失败语义：任何一步失败都保持水位线不动，把错误吸收为存储上的
//! 错误字段；下一个 tick 从同一水位线重试。upsert 幂等，所以重复
//! 投递无害，循环在瞬时故障下自愈。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::events::{EventManager, SdkEvent};
use crate::gateway::ChatGateway;
use crate::storage::ChatStore;
use crate::sync::epoch::{EpochGuard, EpochOutcome};
use crate::utils::now_millis;

/// 单个同步周期的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// epoch 尚未建立（bootstrap 未完成），整个 tick 被跳过
    SkippedNoEpoch,
    /// 检测到 epoch 轮转：本轮不拉增量，全量刷新由调用方 bootstrap 执行
    Rotated,
    /// 成功：水位线已推进（即使两类增量都为空）
    Synced { messages: usize, participants: usize },
    /// 失败：水位线保持不变，错误已记录
    Failed { error: String },
}

/// 增量同步循环
pub struct SyncPoller {
    store: Arc<ChatStore>,
    guard: Arc<EpochGuard>,
    gateway: Arc<dyn ChatGateway>,
    events: Arc<EventManager>,
    /// tick 串行锁：定时 tick 与手动触发绝不交错
    tick_lock: Mutex<()>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl SyncPoller {
    pub fn new(
        store: Arc<ChatStore>,
        guard: Arc<EpochGuard>,
        gateway: Arc<dyn ChatGateway>,
        events: Arc<EventManager>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            guard,
            gateway,
            events,
            tick_lock: Mutex::new(()),
            poll_interval,
            cancel,
        }
    }

    /// 启动循环任务
    ///
    /// 返回的 JoinHandle 在取消令牌触发后结束；飞行中的网络调用允许
    /// 完成，其结果随任务退出一并丢弃，不会再写入存储。
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            // 错过的 tick 顺延，不补跑（补跑会让多个周期挤在一起）
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval 第一次立即到期，消耗掉，从一个完整周期后开始
            interval.tick().await;

            info!("同步循环已启动: 周期 {:?}", self.poll_interval);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!("同步循环已停止");
                        break;
                    }
                    _ = interval.tick() => {
                        self.tick().await;
                    }
                }
            }
        })
    }

    /// 手动触发一次同步周期（与定时 tick 串行）
    pub async fn sync_now(&self) -> TickOutcome {
        self.tick().await
    }

    /// 执行一个完整的同步周期
    async fn tick(&self) -> TickOutcome {
        let _serial = self.tick_lock.lock().await;

        // 1. 前置条件：epoch 未建立说明首次全量拉取还没完成，避免与其竞争
        if !self.guard.has_epoch().await {
            debug!("epoch 尚未建立，跳过本轮同步");
            return TickOutcome::SkippedNoEpoch;
        }

        // 2. 查询远端 epoch 信息；失败则记录并结束本轮，水位线不动
        let server_info = match self.gateway.get_info().await {
            Ok(server_info) => server_info,
            Err(e) => {
                return self.record_failure(format!("获取服务端信息失败: {}", e)).await;
            }
        };

        // 3. 交给纪元守卫。轮转意味着重置已把水位线作废，本轮不再拉增量
        if let EpochOutcome::Rotated { old_epoch } =
            self.guard.apply_remote(&server_info, &self.store).await
        {
            self.events.emit(SdkEvent::StoreReset {
                old_epoch: Some(old_epoch),
                new_epoch: server_info.session_uuid,
                timestamp: now_millis(),
            });
            return TickOutcome::Rotated;
        }

        // 4. 并发拉取两类增量（数据模型上相互独立）
        let since = self.guard.watermark().await;
        let (messages_result, participants_result) = tokio::join!(
            self.gateway.get_messages_updates(since),
            self.gateway.get_participants_updates(since),
        );

        let messages = match messages_result {
            Ok(messages) => messages,
            Err(e) => {
                return self.record_failure(format!("拉取消息增量失败: {}", e)).await;
            }
        };
        let participants = match participants_result {
            Ok(participants) => participants,
            Err(e) => {
                return self
                    .record_failure(format!("拉取参与者增量失败: {}", e))
                    .await;
            }
        };

        let message_count = messages.len();
        let participant_count = participants.len();
        if message_count > 0 {
            self.store.upsert_messages(messages).await;
            self.events.emit(SdkEvent::MessagesUpserted {
                count: message_count,
                timestamp: now_millis(),
            });
        }
        if participant_count > 0 {
            self.store.upsert_participants(participants).await;
            self.events.emit(SdkEvent::ParticipantsUpserted {
                count: participant_count,
                timestamp: now_millis(),
            });
        }

        // 5. 成功（无论是否有记录）：推进水位线到当前本地时间，清除错误
        let watermark = self.guard.advance_watermark(now_millis()).await;
        self.store.set_error(None).await;
        self.events.emit(SdkEvent::SyncCompleted { watermark });
        debug!(
            "同步周期完成: +{} 条消息, +{} 个参与者, watermark={}",
            message_count, participant_count, watermark
        );

        TickOutcome::Synced {
            messages: message_count,
            participants: participant_count,
        }
    }

    /// 6. 失败路径：水位线保持不变，错误写入存储并广播
    async fn record_failure(&self, error: String) -> TickOutcome {
        error!("同步周期失败: {}", error);
        self.store.set_error(Some(error.clone())).await;
        self.events.emit(SdkEvent::SyncFailed {
            error: error.clone(),
            timestamp: now_millis(),
        });
        TickOutcome::Failed { error }
    }
}
