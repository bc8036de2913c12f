use std::fmt;

#[derive(Debug)]
pub enum RoomSyncError {
    /// 网关请求失败（网络不可达、HTTP 状态码错误等）
    Gateway(String),
    /// 响应体解析失败
    Serialization(String),
    /// KV 存储错误
    KvStore(String),
    IO(String),
    InvalidInput(String),
    Config(String),
    NotInitialized(String),
    ShuttingDown(String),
    Other(String),
}

impl fmt::Display for RoomSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomSyncError::Gateway(e) => write!(f, "Gateway error: {}", e),
            RoomSyncError::Serialization(e) => write!(f, "Serialization error: {}", e),
            RoomSyncError::KvStore(e) => write!(f, "KV store error: {}", e),
            RoomSyncError::IO(e) => write!(f, "IO error: {}", e),
            RoomSyncError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            RoomSyncError::Config(e) => write!(f, "Config error: {}", e),
            RoomSyncError::NotInitialized(e) => write!(f, "Not initialized: {}", e),
            RoomSyncError::ShuttingDown(e) => write!(f, "Shutting down: {}", e),
            RoomSyncError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for RoomSyncError {}

impl From<serde_json::Error> for RoomSyncError {
    fn from(error: serde_json::Error) -> Self {
        RoomSyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for RoomSyncError {
    fn from(error: std::io::Error) -> Self {
        RoomSyncError::IO(error.to_string())
    }
}

impl From<reqwest::Error> for RoomSyncError {
    fn from(error: reqwest::Error) -> Self {
        RoomSyncError::Gateway(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RoomSyncError>;
