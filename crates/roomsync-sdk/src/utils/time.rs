//! 时间处理工具模块
//!
//! # 设计原则
//!
//! - **存储层**: 所有时间字段使用 UTC 毫秒时间戳（i64）
//! - **业务层**: 统一使用 `Utc::now().timestamp_millis()` 生成时间
//! - **显示层**: 时区转换由应用层处理，SDK 不做格式化

use chrono::Utc;

/// 当前 UTC 毫秒时间戳
///
/// 水位线（watermark）、消息 sent_at/updated_at 均使用此函数生成。
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
