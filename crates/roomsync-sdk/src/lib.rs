//! RoomSync SDK - 聊天会话的客户端增量同步引擎
//!
//! 本 SDK 维护一份与远端权威数据一致的本地会话视图，包括：
//! - 🔄 增量同步循环：按水位线周期拉取消息/参与者变化并幂等合入
//! - 🛡️ 同步纪元守卫：检测远端数据集重建（epoch 轮转）并安全重置
//! - 📤 乐观发送：本地先行插入，与服务端权威记录原位对账
//! - 💾 持久化快照：`{messages, participants}` 跨重启存活，
//!   watermark/epoch 有意不落盘，冷启动统一全量 bootstrap
//! - ⚙️ 事件系统：UI 协作方只读状态、订阅变化，不轮询存储
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use roomsync_sdk::{RoomSyncConfig, RoomSyncSDK};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 配置 SDK
//!     let config = RoomSyncConfig::builder()
//!         .base_url("http://localhost:3000")
//!         .data_dir("/path/to/data")
//!         .local_user_uuid("you")
//!         .build();
//!
//!     // 初始化：打开快照存储并恢复上次的实体状态
//!     let sdk = RoomSyncSDK::initialize(config).await?;
//!
//!     // 全量对齐远端，然后启动增量同步循环
//!     sdk.bootstrap().await?;
//!     sdk.start_sync().await?;
//!
//!     // 乐观发送
//!     let _sent = sdk.send_message("Hello, World!").await?;
//!
//!     // 读取同步后的状态
//!     for message in sdk.messages().await {
//!         println!("{}: {}", message.author_uuid, message.text);
//!     }
//!
//!     // 关闭：取消同步循环并刷盘
//!     sdk.shutdown().await?;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod error;
pub mod events;
pub mod gateway;
pub mod http_gateway;
pub mod sdk;
pub mod storage;
pub mod sync;
pub mod utils;

// 重新导出核心类型，方便使用
pub use error::{Result, RoomSyncError};
pub use events::{EventManager, SdkEvent};
pub use gateway::ChatGateway;
pub use http_gateway::HttpChatGateway;
pub use sdk::{HttpClientConfig, RoomSyncConfig, RoomSyncConfigBuilder, RoomSyncSDK};
pub use storage::entities::{
    Attachment, Message, Participant, Reaction, ServerInfo, LOCAL_MESSAGE_PREFIX,
};
pub use storage::snapshot::{ChatSnapshot, SnapshotStore};
pub use storage::ChatStore;
pub use sync::{
    EpochGuard, EpochOutcome, PendingSend, PendingSendState, SendCoordinator, SyncPoller,
    TickOutcome,
};
