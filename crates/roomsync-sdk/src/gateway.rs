//! 远端数据网关契约
//!
//! 远端是唯一的数据权威，SDK 不控制它的可用性与持久性。网关契约与
//! 传输无关（参考实现为 HTTP+JSON，见 `http_gateway`），测试中可以
//! 用脚本化的内存实现替换。
//!
//! ## 契约要点
//!
//! - 所有返回列表的操作都可能返回空列表，**永远不会**返回 null；
//! - 传输失败必须以 `Err` 表达，与「空结果」严格区分：
//!   同步循环靠这个区别决定是否推进水位线；
//! - 网关内部不做重试/退避，重试节奏由调用方的自然周期决定
//!   （下一个 tick、用户重新触发 bootstrap）。

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::entities::{Message, Participant, ServerInfo};

/// 远端数据网关
///
/// 五个拉取操作 + 一个推送操作，与远端的 HTTP 接口一一对应。
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// 查询服务端信息（epoch 令牌 + 协议版本）
    async fn get_info(&self) -> Result<ServerInfo>;

    /// 拉取全部消息（完整有序列表，bootstrap 用）
    async fn get_all_messages(&self) -> Result<Vec<Message>>;

    /// 拉取最新一页消息
    async fn get_latest_messages(&self) -> Result<Vec<Message>>;

    /// 拉取比参照消息更早的一页消息（向上翻页）
    async fn get_older_messages(&self, ref_message_uuid: &str) -> Result<Vec<Message>>;

    /// 拉取在水位线之后创建/修改过的消息
    async fn get_messages_updates(&self, since_millis: i64) -> Result<Vec<Message>>;

    /// 拉取全部参与者
    async fn get_all_participants(&self) -> Result<Vec<Participant>>;

    /// 拉取在水位线之后创建/修改过的参与者
    async fn get_participants_updates(&self, since_millis: i64) -> Result<Vec<Participant>>;

    /// 发送一条新消息，成功时返回服务端的权威记录
    async fn post_new_message(&self, text: &str) -> Result<Message>;
}
