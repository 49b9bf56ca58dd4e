//! 远程存储协议数据类型定义
//!
//! 值在 JSON 中以 Base64 编码传输

use crate::backend::Versioned;
use crate::error::StoreResult;
use base64::prelude::*;
use serde::{Deserialize, Serialize};

/// 读取记录响应
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    /// 值（Base64 编码）
    pub value: String,
    /// 版本戳
    pub version: u64,
}

impl RecordResponse {
    pub fn from_versioned(record: &Versioned) -> Self {
        Self {
            value: BASE64_STANDARD.encode(&record.value),
            version: record.version,
        }
    }

    pub fn into_versioned(self) -> StoreResult<Versioned> {
        Ok(Versioned {
            value: BASE64_STANDARD.decode(self.value)?,
            version: self.version,
        })
    }
}

/// 无条件写入请求
#[derive(Debug, Serialize, Deserialize)]
pub struct SetRequest {
    /// 值（Base64 编码）
    pub value: String,
    /// 过期时间（秒）
    pub ttl_seconds: u64,
}

/// 写入响应
#[derive(Debug, Serialize, Deserialize)]
pub struct SetResponse {
    /// 新版本戳
    pub version: u64,
}

/// 比较并交换请求
#[derive(Debug, Serialize, Deserialize)]
pub struct SwapRequest {
    /// 期望的当前版本，`None` 表示记录必须不存在
    pub expected_version: Option<u64>,
    /// 值（Base64 编码）
    pub value: String,
    /// 过期时间（秒）
    pub ttl_seconds: u64,
}

/// 比较并交换响应
#[derive(Debug, Serialize, Deserialize)]
pub struct SwapResponse {
    pub swapped: bool,
}

/// 条件删除请求
#[derive(Debug, Serialize, Deserialize)]
pub struct CompareDeleteRequest {
    /// 期望的当前版本
    pub expected_version: u64,
}

/// 条件删除响应
#[derive(Debug, Serialize, Deserialize)]
pub struct CompareDeleteResponse {
    pub deleted: bool,
}

/// 刷新过期时间请求
#[derive(Debug, Serialize, Deserialize)]
pub struct ExpireRequest {
    pub ttl_seconds: u64,
}

/// 刷新过期时间响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ExpireResponse {
    /// 记录是否存在
    pub refreshed: bool,
}
