//! Redis 存储后端实现
//!
//! 使用 Redis 提供跨进程共享的状态存储

use crate::backend::{StateStore, Versioned, ttl_secs};
use crate::config::RedisConfig;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::{AsyncCommands, Script};
use std::time::Duration;
use tracing::{debug, info};

/// 全局版本号计数器
const VERSION_SEQ_KEY: &str = "veritoken:version-seq";

/// 无条件写入：新版本号取自全局计数器
const SET_SCRIPT: &str = r#"
local version = redis.call('INCR', KEYS[2])
redis.call('DEL', KEYS[1])
redis.call('HSET', KEYS[1], 'data', ARGV[1], 'version', version)
redis.call('EXPIRE', KEYS[1], ARGV[2])
return version
"#;

/// 比较并交换：ARGV[1] 为空串表示 key 必须不存在
const CAS_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if ARGV[1] == '' then
  if current then return 0 end
elseif current ~= ARGV[1] then
  return 0
end
local version = redis.call('INCR', KEYS[2])
redis.call('HSET', KEYS[1], 'data', ARGV[2], 'version', version)
redis.call('EXPIRE', KEYS[1], ARGV[3])
return 1
"#;

/// 版本匹配时删除
const DELETE_IF_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'version') == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Redis 存储后端
///
/// 数据结构设计：
/// - veritoken:version-seq -> Integer (全局自增版本号)
/// - veritoken.{token} -> Hash {data, version}，带 TTL
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    set_script: Script,
    cas_script: Script,
    delete_if_script: Script,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("pool_status", &self.pool.status())
            .finish()
    }
}

impl RedisBackend {
    /// 创建新的 Redis 后端实例
    pub async fn new(config: &RedisConfig) -> StoreResult<Self> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(PoolConfig::new(config.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Config(format!("Failed to create Redis pool: {e}")))?;

        // 测试连接
        let mut conn = pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to Redis: {e}")))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Redis PING failed: {e}")))?;

        info!(
            "Redis state store initialized: url={}, pool_size={}",
            config.url, config.pool_size
        );

        Ok(Self {
            pool,
            set_script: Script::new(SET_SCRIPT),
            cas_script: Script::new(CAS_SCRIPT),
            delete_if_script: Script::new(DELETE_IF_SCRIPT),
        })
    }

    async fn conn(&self) -> StoreResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to get Redis connection: {e}")))
    }
}

#[async_trait]
impl StateStore for RedisBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        let mut conn = self.conn().await?;

        let (data, version): (Option<Vec<u8>>, Option<u64>) = redis::cmd("HMGET")
            .arg(key)
            .arg("data")
            .arg("version")
            .query_async(&mut *conn)
            .await?;

        match (data, version) {
            (Some(value), Some(version)) => Ok(Some(Versioned { value, version })),
            (None, None) => Ok(None),
            _ => {
                debug!("Incomplete record for {} in Redis", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<u64> {
        let mut conn = self.conn().await?;

        let version: u64 = self
            .set_script
            .key(key)
            .key(VERSION_SEQ_KEY)
            .arg(value)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut *conn)
            .await?;

        Ok(version)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &[u8],
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut conn = self.conn().await?;

        let expected = expected.map(|v| v.to_string()).unwrap_or_default();
        let swapped: i64 = self
            .cas_script
            .key(key)
            .key(VERSION_SEQ_KEY)
            .arg(expected)
            .arg(value)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut *conn)
            .await?;

        if swapped == 0 {
            debug!("CAS conflict on {} in Redis", key);
        }
        Ok(swapped == 1)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: u64) -> StoreResult<bool> {
        let mut conn = self.conn().await?;

        let deleted: i64 = self
            .delete_if_script
            .key(key)
            .arg(expected.to_string())
            .invoke_async(&mut *conn)
            .await?;

        if deleted == 0 {
            debug!("Conditional delete skipped for {} in Redis", key);
        }
        Ok(deleted == 1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let refreshed: bool = conn.expire(key, ttl_secs(ttl) as i64).await?;
        Ok(refreshed)
    }

    fn backend_name(&self) -> &'static str {
        "Redis"
    }
}
