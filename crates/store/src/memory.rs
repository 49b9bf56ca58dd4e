//! 内存存储后端实现
//!
//! 单进程部署和测试使用；过期时间基于 `tokio::time::Instant`，
//! 因此在暂停时钟的测试中可以用 `tokio::time::advance` 模拟过期。
//!
//! 过期记录在读取时惰性删除；写入路径在条目数超过水位线或距上次清理
//! 超过 [`PURGE_INTERVAL`] 时整体清理一次，只出现一次的令牌不会常驻内存。

use crate::backend::{StateStore, Versioned};
use crate::error::StoreResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// 触发写入路径清理的默认条目数
pub const DEFAULT_PURGE_THRESHOLD: usize = 1024;
/// 写入路径两次定时清理之间的最长间隔
pub const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    version: u64,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

struct Table {
    map: HashMap<String, Entry>,
    threshold: usize,
    /// 条目数达到此值时清理
    purge_at: usize,
    next_purge: Instant,
}

impl Table {
    fn new(threshold: usize) -> Self {
        Self {
            map: HashMap::new(),
            threshold,
            purge_at: threshold,
            next_purge: Instant::now() + PURGE_INTERVAL,
        }
    }

    fn purge(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_live(now));
        // 存活条目很多时水位线随之上移，避免每次写入都全表扫描
        self.purge_at = self.threshold.max(self.map.len() * 2);
        self.next_purge = now + PURGE_INTERVAL;
        before - self.map.len()
    }

    fn insert(&mut self, key: &str, entry: Entry, now: Instant) {
        if self.map.len() >= self.purge_at || now >= self.next_purge {
            let purged = self.purge(now);
            if purged > 0 {
                debug!("Purged {} expired records on write", purged);
            }
        }
        self.map.insert(key.to_string(), entry);
    }
}

/// 内存存储后端
#[derive(Clone)]
pub struct MemoryBackend {
    entries: Arc<Mutex<Table>>,
    version_seq: Arc<AtomicU64>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("version_seq", &self.version_seq.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_purge_threshold(DEFAULT_PURGE_THRESHOLD)
    }

    /// 指定写入路径清理的条目数水位线（最小为 1）
    pub fn with_purge_threshold(threshold: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Table::new(threshold.max(1)))),
            version_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_version(&self) -> u64 {
        self.version_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 清理所有已过期的记录
    ///
    /// # Returns
    /// 被清理的记录数量
    pub async fn purge_expired(&self) -> usize {
        let purged = self.entries.lock().await.purge(Instant::now());
        if purged > 0 {
            debug!("Purged {} expired records from memory store", purged);
        }
        purged
    }

    /// 当前未过期的记录数
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .map
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StateStore for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.map.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(Versioned {
                value: entry.value.clone(),
                version: entry.version,
            })),
            Some(_) => {
                entries.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<u64> {
        let now = Instant::now();
        let version = self.next_version();
        let entry = Entry {
            value: value.to_vec(),
            version,
            expires_at: now + ttl,
        };
        self.entries.lock().await.insert(key, entry, now);
        Ok(version)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &[u8],
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let current = entries
            .map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.version);

        if current != expected {
            debug!(
                "CAS conflict on {}: expected={:?}, current={:?}",
                key, expected, current
            );
            return Ok(false);
        }

        let entry = Entry {
            value: value.to_vec(),
            version: self.next_version(),
            expires_at: now + ttl,
        };
        entries.insert(key, entry, now);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().await.map.remove(key);
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: u64) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.map.get(key) {
            Some(entry) if entry.is_live(now) && entry.version == expected => {
                entries.map.remove(key);
                Ok(true)
            }
            Some(entry) if !entry.is_live(now) => {
                entries.map.remove(key);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.map.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            Some(_) => {
                entries.map.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn backend_name(&self) -> &'static str {
        "Memory"
    }
}
