//! HTTP 网关实现 - 基于 reqwest 的 `ChatGateway`
//!
//! 远端接口为 HTTP+JSON。所有失败在此被转成 `RoomSyncError::Gateway` /
//! `Serialization`，由调用方吸收；本模块自身不做重试。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::error::{Result, RoomSyncError};
use crate::gateway::ChatGateway;
use crate::sdk::HttpClientConfig;
use crate::storage::entities::{Message, Participant, ServerInfo};

/// HTTP 网关客户端
pub struct HttpChatGateway {
    client: Client,
    base_url: String,
}

impl HttpChatGateway {
    /// 创建新的 HTTP 网关客户端
    ///
    /// 超时到期按普通拉取失败处理（映射为 `Gateway` 错误）。
    pub fn new(base_url: &str, config: &HttpClientConfig) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| RoomSyncError::Other(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET 请求并解析 JSON 响应
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RoomSyncError::Gateway(format!("请求 {} 失败: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "无法读取错误信息".to_string());
            error!("❌ 请求 {} 失败，HTTP 状态码: {}, 错误: {}", path, status, error_text);
            return Err(RoomSyncError::Gateway(format!(
                "请求 {} 失败，HTTP 状态码: {} ({})",
                path, status, error_text
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RoomSyncError::Serialization(format!("解析 {} 响应失败: {}", path, e)))
    }
}

#[async_trait]
impl ChatGateway for HttpChatGateway {
    async fn get_info(&self) -> Result<ServerInfo> {
        self.get_json("/info").await
    }

    async fn get_all_messages(&self) -> Result<Vec<Message>> {
        self.get_json("/messages/all").await
    }

    async fn get_latest_messages(&self) -> Result<Vec<Message>> {
        self.get_json("/messages/latest").await
    }

    async fn get_older_messages(&self, ref_message_uuid: &str) -> Result<Vec<Message>> {
        self.get_json(&format!("/messages/older/{}", ref_message_uuid))
            .await
    }

    async fn get_messages_updates(&self, since_millis: i64) -> Result<Vec<Message>> {
        self.get_json(&format!("/messages/updates/{}", since_millis))
            .await
    }

    async fn get_all_participants(&self) -> Result<Vec<Participant>> {
        self.get_json("/participants/all").await
    }

    async fn get_participants_updates(&self, since_millis: i64) -> Result<Vec<Participant>> {
        self.get_json(&format!("/participants/updates/{}", since_millis))
            .await
    }

    async fn post_new_message(&self, text: &str) -> Result<Message> {
        let url = format!("{}/messages/new", self.base_url);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| RoomSyncError::Gateway(format!("发送消息失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "无法读取错误信息".to_string());
            error!("❌ 发送消息失败，HTTP 状态码: {}, 错误: {}", status, error_text);
            return Err(RoomSyncError::Gateway(format!(
                "发送消息失败，HTTP 状态码: {} ({})",
                status, error_text
            )));
        }

        response
            .json::<Message>()
            .await
            .map_err(|e| RoomSyncError::Serialization(format!("解析发送响应失败: {}", e)))
    }
}
