//! 配置
//!
//! `VeritokenConfig` 在构造 [`crate::TokenGuard`] 时校验一次，之后不可变。
//!
//! ```toml
//! credential = "session"
//! session_cookie_name = "sid"
//! ignore_paths = ["/healthz"]
//!
//! [[validators]]
//! kind = "ip"
//!
//! [[validators]]
//! kind = "usage-budget"
//! limit = 100
//!
//! [storage]
//! backend = "redis"
//!
//! [storage.redis]
//! url = "redis://localhost:6379/0"
//! ```

use crate::credential::{CredentialKind, CredentialSource};
use crate::error::{Error, Result};
use crate::fingerprint::DEFAULT_TRUSTED_IP_HEADER;
use crate::validator::{ValidatorKind, ValidatorSpec};
use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use veritoken_store::{StorageBackend, StorageConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeritokenConfig {
    /// 总开关；关闭时所有请求直接放行，不访问存储
    #[serde(default = "default_true")]
    pub active: bool,

    /// 凭证来源：`bearer`（Authorization 头）或 `session`（Cookie）
    #[serde(default)]
    pub credential: CredentialKind,

    /// `credential = "session"` 时必需
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie_name: Option<String>,

    /// 不做校验的 HTTP 方法（大小写不敏感）
    #[serde(default = "default_ignore_methods")]
    pub ignore_methods: Vec<String>,

    /// 不做校验的路径（精确匹配，不含查询串）
    #[serde(default)]
    pub ignore_paths: Vec<String>,

    /// 优先读取的边缘代理客户端 IP 头
    #[serde(default = "default_trusted_ip_header")]
    pub trusted_ip_header: String,

    /// 记录空闲过期时间（秒），每次校验成功后刷新
    #[serde(default = "default_record_ttl_seconds")]
    pub record_ttl_seconds: u64,

    /// 写冲突时最多重试的完整周期数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// 单次存储调用超时（毫秒）
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// 有序的校验器列表
    #[serde(default = "default_validators")]
    pub validators: Vec<ValidatorSpec>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// 可观测性配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// 过滤级别，EnvFilter 语法（如 "info,veritoken=debug"）
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    /// 以 JSON 格式输出日志
    #[serde(default)]
    pub json: bool,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter_level: default_filter_level(),
            json: false,
            log: LogConfig::default(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// "console"（默认）或 "file"
    #[serde(default = "default_log_output")]
    pub output: String,

    /// output = "file" 时按天轮转
    #[serde(default)]
    pub rotate: bool,

    /// output = "file" 时的日志目录
    #[serde(default = "default_log_path")]
    pub path: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ignore_methods() -> Vec<String> {
    vec!["OPTIONS".to_string(), "GET".to_string()]
}

fn default_trusted_ip_header() -> String {
    DEFAULT_TRUSTED_IP_HEADER.to_string()
}

fn default_record_ttl_seconds() -> u64 {
    3600
}

fn default_max_attempts() -> u32 {
    3
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_validators() -> Vec<ValidatorSpec> {
    vec![
        ValidatorSpec::ip(),
        ValidatorSpec::device(),
        ValidatorSpec::csrf(),
        ValidatorSpec::usage_budget(crate::validator::DEFAULT_USAGE_LIMIT),
    ]
}

fn default_filter_level() -> String {
    "info".to_string()
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

impl Default for VeritokenConfig {
    fn default() -> Self {
        Self {
            active: true,
            credential: CredentialKind::default(),
            session_cookie_name: None,
            ignore_methods: default_ignore_methods(),
            ignore_paths: Vec::new(),
            trusted_ip_header: default_trusted_ip_header(),
            record_ttl_seconds: default_record_ttl_seconds(),
            max_attempts: default_max_attempts(),
            store_timeout_ms: default_store_timeout_ms(),
            validators: default_validators(),
            storage: StorageConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl VeritokenConfig {
    /// 从 TOML 文件加载配置（不做校验）
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_toml(&content)?)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_seconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// 解析凭证来源；session 模式缺少 Cookie 名时返回 `None`
    pub fn credential_source(&self) -> Option<CredentialSource> {
        match self.credential {
            CredentialKind::Bearer => Some(CredentialSource::Bearer),
            CredentialKind::Session => self
                .session_cookie_name
                .as_ref()
                .filter(|name| !name.trim().is_empty())
                .map(|name| CredentialSource::Cookie {
                    name: name.trim().to_string(),
                }),
        }
    }

    /// 校验并返回解析后的 [`CredentialSource`]
    pub fn validated(&self) -> Result<CredentialSource> {
        self.validate().map_err(Error::Config)?;
        self.credential_source()
            .ok_or_else(|| Error::Config(vec!["Missing session_cookie_name".to_string()]))
    }

    /// 验证配置有效性，返回全部问题
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // 校验器
        let mut seen = HashSet::new();
        for spec in &self.validators {
            if !seen.insert(spec.kind) {
                errors.push(format!("Validator '{}' is configured more than once", spec.kind));
            }
            match (spec.kind, spec.limit) {
                (ValidatorKind::UsageBudget, Some(0)) => {
                    errors.push("usage-budget limit must be at least 1".to_string());
                }
                (ValidatorKind::UsageBudget, _) => {}
                (kind, Some(_)) => {
                    errors.push(format!("Validator '{kind}' does not take a limit"));
                }
                (_, None) => {}
            }
        }

        // 凭证
        if self.credential == CredentialKind::Session && self.credential_source().is_none() {
            errors.push("credential = \"session\" requires session_cookie_name".to_string());
        }

        if HeaderName::from_bytes(self.trusted_ip_header.as_bytes()).is_err() {
            errors.push(format!(
                "Invalid trusted_ip_header '{}'",
                self.trusted_ip_header
            ));
        }

        for method in &self.ignore_methods {
            if axum::http::Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(format!("Invalid HTTP method in ignore_methods: '{method}'"));
            }
        }

        // 数值范围
        if self.record_ttl_seconds == 0 {
            errors.push("record_ttl_seconds must be greater than 0".to_string());
        }
        if self.max_attempts == 0 {
            errors.push("max_attempts must be greater than 0".to_string());
        }
        if self.store_timeout_ms == 0 {
            errors.push("store_timeout_ms must be greater than 0".to_string());
        }

        // 存储
        match self.storage.backend {
            StorageBackend::Memory => {}
            StorageBackend::Redis if self.storage.redis.is_none() => {
                errors.push("storage.backend = \"redis\" requires [storage.redis]".to_string());
            }
            StorageBackend::Remote if self.storage.remote.is_none() => {
                errors.push("storage.backend = \"remote\" requires [storage.remote]".to_string());
            }
            _ => {}
        }

        // 可观测性
        if EnvFilter::try_new(&self.observability.filter_level).is_err() {
            errors.push(format!(
                "Invalid filter level '{}' (observability.filter_level)",
                self.observability.filter_level
            ));
        }
        if !["console", "file"].contains(&self.observability.log.output.as_str()) {
            errors.push(format!(
                "Invalid log output '{}' (observability.log.output), must be 'console' or 'file'",
                self.observability.log.output
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
