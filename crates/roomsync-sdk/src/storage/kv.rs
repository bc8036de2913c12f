//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 本模块提供：
//! - 持久化快照的落盘载体
//! - 按命名空间隔离的 Tree
//! - JSON 序列化的值存取

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::error::{Result, RoomSyncError};

/// KV 存储组件
#[derive(Debug, Clone)]
pub struct KvStore {
    #[allow(dead_code)]
    base_path: PathBuf,
    /// 主数据库实例
    db: Arc<Db>,
    /// 命名空间专属的 Tree 实例
    tree: Tree,
}

impl KvStore {
    /// 打开指定命名空间的 KV 存储实例
    ///
    /// 同目录重开时旧实例可能刚释放文件锁，重试多次带退避。
    pub async fn open(base_path: &Path, namespace: &str) -> Result<Self> {
        let base_path = base_path.to_path_buf();
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| RoomSyncError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        const MAX_OPEN_RETRIES: u32 = 8;
        const RETRY_DELAY_MS: u64 = 300;
        let mut db_opt: Option<sled::Db> = None;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = format!("{}", e);
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            RoomSyncError::KvStore(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        let tree = db
            .open_tree(namespace)
            .map_err(|e| RoomSyncError::KvStore(format!("打开命名空间 Tree 失败: {}", e)))?;

        tracing::info!("KV 存储已打开: namespace={}", namespace);

        Ok(Self {
            base_path,
            db: Arc::new(db),
            tree,
        })
    }

    /// 设置键值对
    pub fn set<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| RoomSyncError::Serialization(format!("序列化值失败: {}", e)))?;

        self.tree
            .insert(key, value_bytes)
            .map_err(|e| RoomSyncError::KvStore(format!("设置键值对失败: {}", e)))?;

        Ok(())
    }

    /// 获取键值对
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: for<'de> Deserialize<'de>,
    {
        let result = self
            .tree
            .get(key)
            .map_err(|e| RoomSyncError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(value_bytes) => {
                let value = serde_json::from_slice(&value_bytes)
                    .map_err(|e| RoomSyncError::Serialization(format!("反序列化值失败: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 删除键值对
    pub fn delete<K>(&self, key: K) -> Result<Option<Vec<u8>>>
    where
        K: AsRef<[u8]>,
    {
        let result = self
            .tree
            .remove(key)
            .map_err(|e| RoomSyncError::KvStore(format!("删除键值对失败: {}", e)))?;

        Ok(result.map(|v| v.to_vec()))
    }

    /// 检查键是否存在
    pub fn exists<K>(&self, key: K) -> Result<bool>
    where
        K: AsRef<[u8]>,
    {
        self.tree
            .contains_key(key)
            .map_err(|e| RoomSyncError::KvStore(format!("检查键存在失败: {}", e)))
    }

    /// 刷盘（关闭前调用，保证快照落盘）
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| RoomSyncError::KvStore(format!("刷盘失败: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_kv_store_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::open(temp_dir.path(), "test_ns").await.unwrap();

        // 设置和获取
        let test_data = json!({
            "name": "test",
            "value": 123
        });

        store.set("test_key", &test_data).unwrap();
        let retrieved: serde_json::Value = store.get("test_key").unwrap().unwrap();
        assert_eq!(retrieved, test_data);

        // 检查存在性
        assert!(store.exists("test_key").unwrap());
        assert!(!store.exists("non_existent_key").unwrap());

        // 删除
        store.delete("test_key").unwrap();
        let deleted: Option<serde_json::Value> = store.get("test_key").unwrap();
        assert!(deleted.is_none());
    }

    #[tokio::test]
    async fn test_kv_store_namespace_isolation() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = KvStore::open(temp_dir.path(), "ns_a").await.unwrap();
            store.set("key", &json!({"from": "a"})).unwrap();
            store.flush().await.unwrap();
        }

        // 不同命名空间看不到对方的键
        let other = KvStore::open(temp_dir.path(), "ns_b").await.unwrap();
        let value: Option<serde_json::Value> = other.get("key").unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_kv_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = KvStore::open(temp_dir.path(), "ns").await.unwrap();
            store.set("persisted", &json!({"v": 1})).unwrap();
            store.flush().await.unwrap();
        }

        let reopened = KvStore::open(temp_dir.path(), "ns").await.unwrap();
        let value: serde_json::Value = reopened.get("persisted").unwrap().unwrap();
        assert_eq!(value["v"], 1);
    }
}
