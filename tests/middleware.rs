use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::{Method, StatusCode};
use axum::response::Json;
use axum::routing::any;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use veritoken::store::{MemoryBackend, StateStore, StoreResult, Versioned};
use veritoken::{Decision, TokenGuard, ValidatorSpec, VeritokenConfig};

async fn echo_decision(request: Request) -> Json<Value> {
    match request.extensions().get::<Decision>() {
        Some(decision) => Json(json!(decision)),
        None => Json(json!({ "status": "skipped" })),
    }
}

fn app(guard: &TokenGuard) -> Router {
    guard.protect(
        Router::new()
            .route("/api/orders", any(echo_decision))
            .route("/healthz", any(echo_decision)),
    )
}

fn guard_with(config: VeritokenConfig) -> (TokenGuard, MemoryBackend) {
    let store = MemoryBackend::new();
    let guard = TokenGuard::new(&config, Arc::new(store.clone())).expect("valid config");
    (guard, store)
}

fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("user-agent", "integration-test")
}

async fn call(app: &Router, request: Request<Body>) -> Value {
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_bearer_flow_through_middleware() {
    let (guard, _store) = guard_with(VeritokenConfig {
        validators: vec![ValidatorSpec::ip(), ValidatorSpec::usage_budget(2)],
        ..Default::default()
    });
    let app = app(&guard);

    let make = || {
        request(Method::POST, "/api/orders")
            .header("authorization", "Bearer abc")
            .header("cf-connecting-ip", "1.1.1.1")
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(
        call(&app, make()).await,
        json!({ "status": "success", "message": "new token accepted" })
    );
    assert_eq!(
        call(&app, make()).await,
        json!({ "status": "success", "message": "token valid" })
    );
    // The request still reaches the handler when verification fails
    assert_eq!(
        call(&app, make()).await,
        json!({ "status": "failed", "message": "token has been used more than 2 times" })
    );
    assert_eq!(call(&app, make()).await["message"], "new token accepted");
}

#[tokio::test]
async fn test_ignored_requests_never_touch_store() {
    let (guard, store) = guard_with(VeritokenConfig {
        ignore_paths: vec!["/healthz".to_string()],
        ..Default::default()
    });
    let app = app(&guard);

    for (method, uri) in [
        (Method::GET, "/api/orders"),
        (Method::OPTIONS, "/api/orders"),
        (Method::POST, "/healthz"),
        (Method::POST, "/healthz?verbose=1"),
    ] {
        let req = request(method, uri)
            .header("authorization", "Bearer abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&app, req).await, json!({ "status": "skipped" }));
    }
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_ignored_request_leaves_existing_record_untouched() {
    let (guard, store) = guard_with(VeritokenConfig {
        validators: vec![ValidatorSpec::usage_budget(5)],
        ..Default::default()
    });
    let app = app(&guard);

    let post = request(Method::POST, "/api/orders")
        .header("authorization", "Bearer abc")
        .body(Body::empty())
        .unwrap();
    call(&app, post).await;
    let before = store.get("veritoken.abc").await.unwrap().unwrap();

    let get = request(Method::GET, "/api/orders")
        .header("authorization", "Bearer abc")
        .body(Body::empty())
        .unwrap();
    call(&app, get).await;
    let after = store.get("veritoken.abc").await.unwrap().unwrap();

    assert_eq!(before, after);
}

#[tokio::test]
async fn test_missing_credential_reaches_handler() {
    let (guard, store) = guard_with(VeritokenConfig::default());
    let app = app(&guard);

    let req = request(Method::POST, "/api/orders")
        .header("authorization", "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        call(&app, req).await,
        json!({ "status": "failed", "message": "missing credential" })
    );
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_session_cookie_credential() {
    let (guard, store) = guard_with(VeritokenConfig {
        credential: veritoken::CredentialKind::Session,
        session_cookie_name: Some("sid".to_string()),
        validators: vec![ValidatorSpec::device()],
        ..Default::default()
    });
    let app = app(&guard);

    let req = request(Method::PUT, "/api/orders")
        .header("cookie", "theme=dark; sid=s3ss10n")
        .body(Body::empty())
        .unwrap();
    assert_eq!(call(&app, req).await["message"], "new token accepted");
    assert!(store.get("veritoken.s3ss10n").await.unwrap().is_some());

    let stolen = Request::builder()
        .method(Method::PUT)
        .uri("/api/orders")
        .header("user-agent", "other-browser")
        .header("cookie", "sid=s3ss10n")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        call(&app, stolen).await["message"],
        "device signature has changed"
    );
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_peer_address_from_connect_info() {
    let (guard, _store) = guard_with(VeritokenConfig {
        validators: vec![ValidatorSpec::ip()],
        ..Default::default()
    });
    let app = app(&guard);

    let from = |addr: &str| {
        let mut req = request(Method::POST, "/api/orders")
            .header("authorization", "Bearer abc")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = addr.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    };

    assert_eq!(call(&app, from("192.0.2.1:5000")).await["status"], "success");
    // Source port changes are irrelevant
    assert_eq!(call(&app, from("192.0.2.1:6000")).await["status"], "success");
    assert_eq!(
        call(&app, from("192.0.2.2:5000")).await["message"],
        "IP address has changed"
    );
}

#[tokio::test]
async fn test_inactive_guard_skips_everything() {
    let (guard, store) = guard_with(VeritokenConfig {
        active: false,
        ..Default::default()
    });
    let app = app(&guard);

    let req = request(Method::POST, "/api/orders")
        .header("authorization", "Bearer abc")
        .body(Body::empty())
        .unwrap();
    assert_eq!(call(&app, req).await, json!({ "status": "skipped" }));
    assert!(store.is_empty().await);
}

struct PanickingStore;

#[async_trait]
impl StateStore for PanickingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<Versioned>> {
        panic!("driver bug");
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> StoreResult<u64> {
        unreachable!()
    }

    async fn compare_and_swap(
        &self,
        _key: &str,
        _expected: Option<u64>,
        _value: &[u8],
        _ttl: Duration,
    ) -> StoreResult<bool> {
        unreachable!()
    }

    async fn delete(&self, _key: &str) -> StoreResult<()> {
        unreachable!()
    }

    async fn compare_and_delete(&self, _key: &str, _expected: u64) -> StoreResult<bool> {
        unreachable!()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> StoreResult<bool> {
        unreachable!()
    }

    fn backend_name(&self) -> &'static str {
        "panicking"
    }
}

#[tokio::test]
async fn test_panic_becomes_internal_fault() {
    let guard = TokenGuard::new(&VeritokenConfig::default(), Arc::new(PanickingStore)).unwrap();
    let app = app(&guard);

    let req = request(Method::POST, "/api/orders")
        .header("authorization", "Bearer abc")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        call(&app, req).await,
        json!({ "status": "failed", "message": "internal fault" })
    );
}
