//! 远程验证服务后端 - 通过 HTTP 访问另一个进程中的状态存储
//!
//! 服务端由 [`crate::handlers::create_router`] 提供

use crate::backend::{StateStore, Versioned, ttl_secs};
use crate::config::RemoteConfig;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    CompareDeleteRequest, CompareDeleteResponse, ExpireRequest, ExpireResponse, RecordResponse,
    SetRequest, SetResponse, SwapRequest, SwapResponse,
};
use async_trait::async_trait;
use base64::prelude::*;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::{debug, error};

/// 远程验证服务后端
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    endpoint: Url,
    client: reqwest::Client,
}

impl RemoteBackend {
    /// 创建新的远程后端
    pub fn new(config: &RemoteConfig) -> StoreResult<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| StoreError::Config(format!("Invalid remote endpoint: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "Remote endpoint cannot be used as a base URL: {}",
                config.endpoint
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { endpoint, client })
    }

    fn record_url(&self, key: &str, action: Option<&str>) -> StoreResult<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Config("Remote endpoint has no path".to_string()))?;
            segments.pop_if_empty().push("records").push(key);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    async fn check_status(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        error!("Verification service returned HTTP {}: {}", status, body);
        Err(StoreError::Remote {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl StateStore for RemoteBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        let url = self.record_url(key, None)?;
        debug!("Fetching record from verification service at {}", url);

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let record: RecordResponse = Self::check_status(response).await?.json().await?;
        Ok(Some(record.into_versioned()?))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<u64> {
        let url = self.record_url(key, None)?;
        let request = SetRequest {
            value: BASE64_STANDARD.encode(value),
            ttl_seconds: ttl_secs(ttl),
        };

        let response = self.client.put(url).json(&request).send().await?;
        let response: SetResponse = Self::check_status(response).await?.json().await?;
        Ok(response.version)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &[u8],
        ttl: Duration,
    ) -> StoreResult<bool> {
        let url = self.record_url(key, Some("swap"))?;
        let request = SwapRequest {
            expected_version: expected,
            value: BASE64_STANDARD.encode(value),
            ttl_seconds: ttl_secs(ttl),
        };

        let response = self.client.post(url).json(&request).send().await?;
        let response: SwapResponse = Self::check_status(response).await?.json().await?;
        Ok(response.swapped)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let url = self.record_url(key, None)?;
        let response = self.client.delete(url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: u64) -> StoreResult<bool> {
        let url = self.record_url(key, Some("delete"))?;
        let request = CompareDeleteRequest {
            expected_version: expected,
        };

        let response = self.client.post(url).json(&request).send().await?;
        let response: CompareDeleteResponse = Self::check_status(response).await?.json().await?;
        Ok(response.deleted)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let url = self.record_url(key, Some("expire"))?;
        let request = ExpireRequest {
            ttl_seconds: ttl_secs(ttl),
        };

        let response = self.client.post(url).json(&request).send().await?;
        let response: ExpireResponse = Self::check_status(response).await?.json().await?;
        Ok(response.refreshed)
    }

    fn backend_name(&self) -> &'static str {
        "Remote"
    }
}
