//! 状态存储统一入口
//!
//! - `StateStore` trait 定义统一的异步接口
//! - `StateStorage` enum 封装不同的后端实现
//! - 通过 `StorageConfig` 配置选择和初始化后端

use crate::backend::{StateStore, Versioned};
use crate::config::{StorageBackend, StorageConfig};
use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryBackend;
use crate::remote::RemoteBackend;
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "backend-redis")]
use crate::redis::RedisBackend;

/// 状态存储统一接口
///
/// 使用 enum 封装后端，可以 Clone，并在整个进程中共享同一个连接池。
#[derive(Clone, Debug)]
pub enum StateStorage {
    /// 进程内存储（始终可用）
    Memory(MemoryBackend),

    /// Redis 存储后端
    #[cfg(feature = "backend-redis")]
    Redis(RedisBackend),

    /// 远程验证服务
    Remote(RemoteBackend),
}

impl StateStorage {
    /// 从配置创建存储实例
    ///
    /// # Errors
    /// - 缺少对应后端的配置
    /// - 后端初始化失败
    /// - 后端功能未启用（feature flag）
    pub async fn from_config(config: &StorageConfig) -> StoreResult<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(Self::Memory(MemoryBackend::new())),

            #[cfg(feature = "backend-redis")]
            StorageBackend::Redis => {
                let cfg = config
                    .redis
                    .as_ref()
                    .ok_or_else(|| StoreError::Config("Missing Redis config".into()))?;
                Ok(Self::Redis(RedisBackend::new(cfg).await?))
            }

            #[cfg(not(feature = "backend-redis"))]
            StorageBackend::Redis => Err(StoreError::Config(
                "Redis backend not enabled. Compile with --features backend-redis".into(),
            )),

            StorageBackend::Remote => {
                let cfg = config
                    .remote
                    .as_ref()
                    .ok_or_else(|| StoreError::Config("Missing remote config".into()))?;
                Ok(Self::Remote(RemoteBackend::new(cfg)?))
            }
        }
    }
}

#[async_trait]
impl StateStore for StateStorage {
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        match self {
            Self::Memory(b) => b.get(key).await,

            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.get(key).await,

            Self::Remote(b) => b.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<u64> {
        match self {
            Self::Memory(b) => b.set(key, value, ttl).await,

            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.set(key, value, ttl).await,

            Self::Remote(b) => b.set(key, value, ttl).await,
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &[u8],
        ttl: Duration,
    ) -> StoreResult<bool> {
        match self {
            Self::Memory(b) => b.compare_and_swap(key, expected, value, ttl).await,

            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.compare_and_swap(key, expected, value, ttl).await,

            Self::Remote(b) => b.compare_and_swap(key, expected, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        match self {
            Self::Memory(b) => b.delete(key).await,

            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.delete(key).await,

            Self::Remote(b) => b.delete(key).await,
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: u64) -> StoreResult<bool> {
        match self {
            Self::Memory(b) => b.compare_and_delete(key, expected).await,

            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.compare_and_delete(key, expected).await,

            Self::Remote(b) => b.compare_and_delete(key, expected).await,
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        match self {
            Self::Memory(b) => b.expire(key, ttl).await,

            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.expire(key, ttl).await,

            Self::Remote(b) => b.expire(key, ttl).await,
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(b) => b.backend_name(),

            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.backend_name(),

            Self::Remote(b) => b.backend_name(),
        }
    }
}
