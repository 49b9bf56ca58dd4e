//! 状态存储错误定义

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// 状态存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 后端不可用（连接失败、连接池耗尽等）
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    /// 远程验证服务无法访问
    #[error("Verification service unreachable: {0}")]
    Unreachable(String),

    /// 调用超时
    #[error("State store call timed out after {0}ms")]
    Timeout(u64),

    /// 远程服务返回非成功状态码
    #[error("Verification service returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// 无效的请求参数
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 内部错误
    #[error("Internal store error: {0}")]
    Internal(String),

    /// Base64 编码/解码错误
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Redis 错误
    #[cfg(feature = "backend-redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StoreError {
    /// 是否为网络层面的失败（远程服务不可达）
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StoreError::Unreachable(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            StoreError::Unreachable(e.to_string())
        } else {
            StoreError::Internal(format!("HTTP client error: {e}"))
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            StoreError::InvalidRequest(_) | StoreError::Base64(_) | StoreError::Json(_) => (
                StatusCode::BAD_REQUEST,
                "Invalid request parameters".to_string(),
            ),
            StoreError::Unavailable(_) | StoreError::Timeout(_) => {
                tracing::error!("Backend unavailable: {:?}", self);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "State store unavailable".to_string(),
                )
            }
            _ => {
                // 不向客户端暴露内部错误详情
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// 存储结果类型别名
pub type StoreResult<T> = Result<T, StoreError>;
