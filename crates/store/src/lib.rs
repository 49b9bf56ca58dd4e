//! veritoken 状态存储
//!
//! 为令牌指纹记录提供带版本戳的键值存储：
//! 1. 统一的异步 `StateStore` 接口（get / set / compare_and_swap / delete / compare_and_delete / expire）
//! 2. 多存储后端支持：内存、Redis、远程验证服务
//! 3. 把任意后端暴露为 HTTP 服务的路由

pub mod backend;
pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
#[cfg(feature = "backend-redis")]
pub mod redis;
pub mod remote;
pub mod storage;
pub mod types;

// Re-export commonly used items
pub use backend::{StateStore, Versioned, ttl_secs};
pub use config::{RedisConfig, RemoteConfig, StorageBackend, StorageConfig};
pub use error::{StoreError, StoreResult};
pub use handlers::{StoreState, create_router};
pub use memory::MemoryBackend;
#[cfg(feature = "backend-redis")]
pub use crate::redis::RedisBackend;
pub use remote::RemoteBackend;
pub use storage::StateStorage;
