//! Request guard and axum middleware
//!
//! The guard decides whether a request is subject to verification at all
//! (master switch, ignored methods and paths), locates the credential and
//! hands it to the [`Engine`]. It never rejects a request itself: the
//! [`Decision`] is attached to the request extensions and downstream
//! handlers decide what to do with a failed one.

use crate::config::VeritokenConfig;
use crate::credential::CredentialSource;
use crate::engine::{Decision, Engine};
use crate::error::{Error, Result, VerifyError};
use crate::fingerprint::FingerprintExtractor;
use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use futures::FutureExt;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info};
use veritoken_store::{StateStorage, StateStore};

struct GuardInner {
    active: bool,
    ignore_methods: HashSet<Method>,
    ignore_paths: HashSet<String>,
    credential: CredentialSource,
    extractor: FingerprintExtractor,
    engine: Engine,
}

/// Shared, cheaply clonable request guard.
#[derive(Clone)]
pub struct TokenGuard {
    inner: Arc<GuardInner>,
}

impl std::fmt::Debug for TokenGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGuard")
            .field("active", &self.inner.active)
            .field("credential", &self.inner.credential)
            .field("engine", &self.inner.engine)
            .finish()
    }
}

impl TokenGuard {
    /// Builds a guard over an existing store.
    ///
    /// The configuration is validated here; every problem is reported at once.
    pub fn new(config: &VeritokenConfig, store: Arc<dyn StateStore>) -> Result<Self> {
        let credential = config.validated()?;

        let trusted_ip_header = HeaderName::from_bytes(config.trusted_ip_header.as_bytes())
            .map_err(|e| Error::Config(vec![format!("Invalid trusted_ip_header: {e}")]))?;

        let ignore_methods = config
            .ignore_methods
            .iter()
            .map(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()))
            .collect::<std::result::Result<HashSet<_>, _>>()
            .map_err(|e| Error::Config(vec![format!("Invalid ignore_methods entry: {e}")]))?;

        let engine = Engine::new(store, config.validators.clone())
            .with_ttl(config.record_ttl())
            .with_max_attempts(config.max_attempts)
            .with_store_timeout(config.store_timeout());

        info!(
            active = config.active,
            backend = engine.store().backend_name(),
            validators = engine.specs().len(),
            "Token guard ready"
        );

        Ok(Self {
            inner: Arc::new(GuardInner {
                active: config.active,
                ignore_methods,
                ignore_paths: config.ignore_paths.iter().cloned().collect(),
                credential,
                extractor: FingerprintExtractor::new(trusted_ip_header),
                engine,
            }),
        })
    }

    /// Builds the configured storage backend, then the guard.
    pub async fn from_config(config: &VeritokenConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        let storage = StateStorage::from_config(&config.storage).await?;
        Self::new(config, Arc::new(storage))
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Whether a request bypasses verification entirely.
    pub fn is_ignored(&self, method: &Method, path: &str) -> bool {
        !self.inner.active
            || self.inner.ignore_methods.contains(method)
            || self.inner.ignore_paths.contains(path)
    }

    /// Verifies one request.
    ///
    /// Returns `None` when the request is ignored, in which case the store is
    /// not touched. A panic inside the engine becomes an internal fault.
    pub async fn inspect(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
    ) -> Option<Decision> {
        if self.is_ignored(method, path) {
            return None;
        }

        let token = self.inner.credential.extract(headers).unwrap_or_default();
        let fingerprints = self.inner.extractor.extract(headers, peer);

        let decision = AssertUnwindSafe(self.inner.engine.authorize(&token, &fingerprints))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let detail = panic_message(panic.as_ref());
                error!(%method, path, panic = %detail, "Verification panicked");
                Decision::failed(VerifyError::internal(detail))
            });

        Some(decision)
    }

    /// Installs [`veritoken_middleware`] on every route of `router`.
    pub fn protect<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(
            self.clone(),
            veritoken_middleware,
        ))
    }
}

/// axum middleware for `from_fn_with_state`.
///
/// Always forwards the request; the [`Decision`] (if any) is available to
/// handlers as `Extension<Decision>`.
pub async fn veritoken_middleware(
    State(guard): State<TokenGuard>,
    request: Request,
    next: Next,
) -> Response {
    // The body is not Sync; only the parts are borrowed across the await
    let (mut parts, body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let decision = guard
        .inspect(&parts.method, parts.uri.path(), &parts.headers, peer)
        .await;

    if let Some(decision) = decision {
        parts.extensions.insert(decision);
    }

    next.run(Request::from_parts(parts, body)).await
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidatorSpec;
    use axum::http::{HeaderValue, header};
    use veritoken_store::MemoryBackend;

    fn guard(config: VeritokenConfig) -> (TokenGuard, MemoryBackend) {
        let store = MemoryBackend::new();
        let guard = TokenGuard::new(&config, Arc::new(store.clone())).unwrap();
        (guard, store)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_ignored_methods_and_paths() {
        let (guard, store) = guard(VeritokenConfig {
            ignore_methods: vec!["options".to_string(), "GET".to_string()],
            ignore_paths: vec!["/public".to_string()],
            ..Default::default()
        });

        assert!(guard.is_ignored(&Method::OPTIONS, "/api"));
        assert!(guard.is_ignored(&Method::GET, "/api"));
        assert!(guard.is_ignored(&Method::POST, "/public"));
        assert!(!guard.is_ignored(&Method::POST, "/public/nested"));

        let decision = guard
            .inspect(&Method::GET, "/api", &bearer("tok"), None)
            .await;
        assert_eq!(decision, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_inactive_guard_passes_everything() {
        let (guard, store) = guard(VeritokenConfig {
            active: false,
            ..Default::default()
        });
        let decision = guard
            .inspect(&Method::POST, "/api", &bearer("tok"), None)
            .await;
        assert_eq!(decision, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let (guard, store) = guard(VeritokenConfig::default());
        let decision = guard
            .inspect(&Method::POST, "/api", &HeaderMap::new(), None)
            .await
            .unwrap();
        assert_eq!(decision.message, "missing credential");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_peer_address_is_bound() {
        let (guard, _store) = guard(VeritokenConfig {
            validators: vec![ValidatorSpec::ip()],
            ..Default::default()
        });
        let peer_a: IpAddr = "192.0.2.1".parse().unwrap();
        let peer_b: IpAddr = "192.0.2.2".parse().unwrap();

        let first = guard
            .inspect(&Method::POST, "/api", &bearer("tok"), Some(peer_a))
            .await
            .unwrap();
        assert!(first.is_success());

        let moved = guard
            .inspect(&Method::POST, "/api", &bearer("tok"), Some(peer_b))
            .await
            .unwrap();
        assert_eq!(moved.message, "IP address has changed");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = VeritokenConfig {
            record_ttl_seconds: 0,
            ..Default::default()
        };
        let err = TokenGuard::new(&config, Arc::new(MemoryBackend::new())).unwrap_err();
        assert!(err.to_string().contains("record_ttl_seconds"));
    }

    #[tokio::test]
    async fn test_from_config_memory() {
        let guard = TokenGuard::from_config(&VeritokenConfig::default())
            .await
            .unwrap();
        assert_eq!(guard.engine().store().backend_name(), "Memory");
        assert_eq!(guard.engine().specs().len(), 4);
    }

    #[cfg(not(feature = "backend-redis"))]
    #[tokio::test]
    async fn test_from_config_redis_not_compiled() {
        let config = VeritokenConfig::from_toml(
            "[storage]\nbackend = \"redis\"\n\n[storage.redis]\nurl = \"redis://localhost:6379/0\"",
        )
        .unwrap();
        let err = TokenGuard::from_config(&config).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)), "{err}");
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
