//! 存储后端配置
//!
//! 定义各种存储后端的配置结构

use serde::{Deserialize, Serialize};

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 存储后端类型
    pub backend: StorageBackend,

    /// Redis 配置（当 backend = "redis" 时必需）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,

    /// 远程验证服务配置（当 backend = "remote" 时必需）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            redis: None,
            remote: None,
        }
    }
}

/// 存储后端类型枚举
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// 进程内存储
    Memory,
    /// Redis 内存数据库
    Redis,
    /// 通过 HTTP 访问的远程验证服务
    Remote,
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis 连接 URL
    ///
    /// 格式：redis://[username:password@]host[:port][/database]
    /// 示例：redis://localhost:6379/0
    pub url: String,

    /// 连接池大小
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool_size: default_redis_pool_size(),
        }
    }
}

fn default_redis_pool_size() -> usize {
    20
}

/// 远程验证服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// 服务地址
    ///
    /// 完整 URL，包括协议、主机和端口。
    /// 例如: "http://127.0.0.1:8095" 或 "https://verify.example.com"
    pub endpoint: String,

    /// 请求超时时间（毫秒）
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8095".to_string(),
            timeout_ms: default_remote_timeout_ms(),
        }
    }
}

fn default_remote_timeout_ms() -> u64 {
    2000
}
