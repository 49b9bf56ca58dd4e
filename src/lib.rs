//! # veritoken
//!
//! 不透明 Bearer 令牌 / 会话 ID 的"首次绑定、后续校验"授权引擎：
//! 令牌首次出现时绑定客户端 IP、设备签名、防伪令牌与使用次数预算，
//! 之后每次请求都与绑定值比对，任何不匹配或预算耗尽都会立即吊销该令牌。
//!
//! ```no_run
//! use axum::{Extension, Router, routing::post};
//! use veritoken::{Decision, TokenGuard, VeritokenConfig};
//!
//! # async fn run() -> veritoken::Result<()> {
//! let config = VeritokenConfig::from_file("veritoken.toml")?;
//! let guard = TokenGuard::from_config(&config).await?;
//!
//! let app: Router = guard.protect(Router::new().route(
//!     "/orders",
//!     post(|Extension(decision): Extension<Decision>| async move {
//!         decision.message
//!     }),
//! ));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credential;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod metrics;
pub mod observability;
pub mod record;
pub mod validator;

// Re-export commonly used types
pub use config::{LogConfig, ObservabilityConfig, VeritokenConfig};
pub use credential::{CredentialKind, CredentialSource};
pub use engine::{Decision, Engine, Status, token_hint};
pub use error::{Error, Result, VerifyError};
pub use fingerprint::{FingerprintExtractor, Fingerprints};
pub use guard::{TokenGuard, veritoken_middleware};
pub use observability::{ObservabilityGuard, init_observability};
pub use record::TokenRecord;
pub use validator::{FingerprintKind, ValidatorKind, ValidatorSpec, ValidatorState};

pub use veritoken_store as store;
