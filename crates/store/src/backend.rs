//! 状态存储后端抽象接口
//!
//! 定义了所有存储后端必须实现的统一异步接口

use crate::error::StoreResult;
use async_trait::async_trait;
use std::time::Duration;

/// 带版本戳的存储值
///
/// `version` 在整个存储范围内唯一且单调递增，删除后重新写入的同名 key
/// 不会复用旧版本号，因此持有旧版本的调用方无法覆盖新的记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// 原始字节
    pub value: Vec<u8>,
    /// 版本戳
    pub version: u64,
}

/// 状态存储后端抽象接口
///
/// 所有存储后端（内存、Redis、远程服务）都需要实现此 trait。
/// 除 `compare_and_swap` 外不假设任何跨调用的事务保证。
#[async_trait]
pub trait StateStore: Send + Sync {
    /// 读取最新提交的值
    ///
    /// # Returns
    /// * `Ok(Some(versioned))` - 找到记录
    /// * `Ok(None)` - 记录不存在或已过期
    /// * `Err(...)` - 存储错误
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned>>;

    /// 无条件覆盖写入并设置过期时间
    ///
    /// # Returns
    /// 新写入值的版本戳
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<u64>;

    /// 原子比较并交换
    ///
    /// 仅当当前版本等于 `expected` 时写入；`expected = None` 表示 key 必须不存在。
    ///
    /// # Returns
    /// * `Ok(true)` - 写入成功
    /// * `Ok(false)` - 版本冲突，未写入
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &[u8],
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// 删除记录（幂等）
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// 仅当当前版本等于 `expected` 时删除
    ///
    /// 持有旧版本的调用方不会删掉其他请求在此期间重新写入的记录。
    ///
    /// # Returns
    /// * `Ok(true)` - 已删除
    /// * `Ok(false)` - 记录不存在或版本已变化
    async fn compare_and_delete(&self, key: &str, expected: u64) -> StoreResult<bool>;

    /// 刷新已有记录的过期时间
    ///
    /// # Returns
    /// * `Ok(true)` - 记录存在且已刷新
    /// * `Ok(false)` - 记录不存在
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// 后端类型名称
    fn backend_name(&self) -> &'static str;
}

/// 以整秒表示的过期时间
///
/// Redis 的 `EXPIRE key 0` 会立即删除 key，远程服务拒绝 0 秒，
/// 因此不足一秒的 TTL 向上取整为 1 秒。
pub fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
