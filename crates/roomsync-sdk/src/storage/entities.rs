//! 数据实体定义 - 对应远端 JSON 结构
//!
//! 这里定义了远端返回的所有实体对应的 Rust 结构体，用于：
//! - 类型安全的数据传输
//! - 统一的数据表示
//! - 序列化/反序列化支持（wire 格式为 camelCase JSON）

use serde::{Deserialize, Serialize};

/// 本地临时消息 ID 的命名空间前缀
///
/// 乐观发送时本地合成的消息使用 `local-<uuid>` 形式的 ID，
/// 与服务端下发的 ID 天然区分，发送成功后被权威记录原位替换。
pub const LOCAL_MESSAGE_PREFIX: &str = "local-";

/// 消息实体
///
/// ID 在存储内唯一；`sent_at` 创建后不可变；`updated_at >= sent_at`，
/// 相等表示从未被编辑过。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// 服务端消息 ID（本地临时消息为 `local-` 前缀）
    pub uuid: String,
    /// 作者（参与者）ID
    pub author_uuid: String,
    /// 消息正文
    pub text: String,
    /// 创建时间（UTC 毫秒时间戳，不可变）
    pub sent_at: i64,
    /// 最后修改时间（UTC 毫秒时间戳）
    pub updated_at: i64,
    /// 附件列表（有序）
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// 表情反馈列表（有序）
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// 被回复消息的 ID（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_uuid: Option<String>,
}

impl Message {
    /// 是否被编辑过（updated_at 与 sent_at 相等表示从未编辑）
    pub fn was_edited(&self) -> bool {
        self.updated_at > self.sent_at
    }

    /// 是否为本地合成的临时消息（尚未获得服务端权威记录）
    pub fn is_provisional(&self) -> bool {
        self.uuid.starts_with(LOCAL_MESSAGE_PREFIX)
    }
}

/// 附件实体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub uuid: String,
    /// 附件类型（如 "image"）
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// 表情反馈实体
///
/// 通过包含关系挂在所属消息上，不单独存储。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub uuid: String,
    /// 反馈者（参与者）ID
    pub participant_uuid: String,
    /// 反馈内容（短符号，如 "👍"）
    pub value: String,
}

/// 参与者实体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub uuid: String,
    /// 显示名称
    pub name: String,
    /// 头像地址（可选）
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// 个人简介（可选）
    #[serde(default)]
    pub bio: Option<String>,
    /// 职位（可选）
    #[serde(default)]
    pub job_title: Option<String>,
    /// 邮箱（可选）
    #[serde(default)]
    pub email: Option<String>,
    /// 加入时间（UTC 毫秒时间戳）
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

/// 服务端信息 - 同步纪元（epoch）令牌 + 协议版本
///
/// `session_uuid` 变化表示远端数据集被重建（如后端存储重启），
/// 是唯一允许清空本地消息/参与者状态的触发条件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub session_uuid: String,
    pub api_version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        // wire 为 camelCase；attachments/reactions 缺省时反序列化为空列表
        let json = r#"{
            "uuid": "m1",
            "authorUuid": "p1",
            "text": "hello",
            "sentAt": 100,
            "updatedAt": 100
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.uuid, "m1");
        assert_eq!(msg.author_uuid, "p1");
        assert_eq!(msg.sent_at, 100);
        assert!(msg.attachments.is_empty());
        assert!(msg.reactions.is_empty());
        assert!(msg.reply_to_message_uuid.is_none());
        assert!(!msg.was_edited());
    }

    #[test]
    fn test_message_edited_and_provisional() {
        let json = r#"{
            "uuid": "local-abc",
            "authorUuid": "you",
            "text": "hi",
            "sentAt": 100,
            "updatedAt": 200,
            "attachments": [{"uuid": "a1", "type": "image", "url": "http://x/1.png", "width": 10, "height": 20}],
            "reactions": [{"uuid": "r1", "participantUuid": "p2", "value": "👍"}]
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.was_edited());
        assert!(msg.is_provisional());
        assert_eq!(msg.attachments[0].kind, "image");
        assert_eq!(msg.reactions[0].value, "👍");
    }

    #[test]
    fn test_server_info_roundtrip() {
        let info = ServerInfo {
            session_uuid: "E1".to_string(),
            api_version: 2,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("sessionUuid"));
        assert!(json.contains("apiVersion"));
        let back: ServerInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
