//! 远程验证服务 HTTP 处理器
//!
//! 把任意 [`StateStore`] 暴露为 HTTP 服务，供 [`crate::remote::RemoteBackend`] 访问

use crate::backend::StateStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    CompareDeleteRequest, CompareDeleteResponse, ExpireRequest, ExpireResponse, RecordResponse,
    SetRequest, SetResponse, SwapRequest, SwapResponse,
};
use axum::{
    Router,
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 服务状态
#[derive(Clone)]
pub struct StoreState {
    pub store: Arc<dyn StateStore>,
}

impl StoreState {
    pub fn new<S: StateStore + 'static>(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

/// 创建验证服务的路由
pub fn create_router(state: StoreState) -> Router {
    info!(
        "Creating verification service router (backend={})",
        state.store.backend_name()
    );

    Router::new()
        .route(
            "/records/{key}",
            get(get_record_handler)
                .put(set_record_handler)
                .delete(delete_record_handler),
        )
        .route("/records/{key}/swap", post(swap_record_handler))
        .route("/records/{key}/expire", post(expire_record_handler))
        .route("/records/{key}/delete", post(compare_delete_record_handler))
        .route("/health", get(health_check_handler))
        .with_state(state)
}

fn ttl_from_secs(ttl_seconds: u64) -> StoreResult<Duration> {
    if ttl_seconds == 0 {
        return Err(StoreError::InvalidRequest(
            "ttl_seconds must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(ttl_seconds))
}

async fn get_record_handler(
    State(state): State<StoreState>,
    Path(key): Path<String>,
) -> Result<Response, StoreError> {
    match state.store.get(&key).await? {
        Some(record) => {
            debug!("Record found: version={}", record.version);
            Ok(Json(RecordResponse::from_versioned(&record)).into_response())
        }
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

async fn set_record_handler(
    State(state): State<StoreState>,
    Path(key): Path<String>,
    Json(request): Json<SetRequest>,
) -> Result<Json<SetResponse>, StoreError> {
    let ttl = ttl_from_secs(request.ttl_seconds)?;
    let value = BASE64_STANDARD.decode(&request.value)?;
    let version = state.store.set(&key, &value, ttl).await?;
    Ok(Json(SetResponse { version }))
}

async fn swap_record_handler(
    State(state): State<StoreState>,
    Path(key): Path<String>,
    Json(request): Json<SwapRequest>,
) -> Result<Json<SwapResponse>, StoreError> {
    let ttl = ttl_from_secs(request.ttl_seconds)?;
    let value = BASE64_STANDARD.decode(&request.value)?;
    let swapped = state
        .store
        .compare_and_swap(&key, request.expected_version, &value, ttl)
        .await?;
    Ok(Json(SwapResponse { swapped }))
}

async fn expire_record_handler(
    State(state): State<StoreState>,
    Path(key): Path<String>,
    Json(request): Json<ExpireRequest>,
) -> Result<Json<ExpireResponse>, StoreError> {
    let ttl = ttl_from_secs(request.ttl_seconds)?;
    let refreshed = state.store.expire(&key, ttl).await?;
    Ok(Json(ExpireResponse { refreshed }))
}

async fn delete_record_handler(
    State(state): State<StoreState>,
    Path(key): Path<String>,
) -> Result<StatusCode, StoreError> {
    state.store.delete(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn compare_delete_record_handler(
    State(state): State<StoreState>,
    Path(key): Path<String>,
    Json(request): Json<CompareDeleteRequest>,
) -> Result<Json<CompareDeleteResponse>, StoreError> {
    let deleted = state
        .store
        .compare_and_delete(&key, request.expected_version)
        .await?;
    Ok(Json(CompareDeleteResponse { deleted }))
}

async fn health_check_handler(State(state): State<StoreState>) -> Json<serde_json::Value> {
    debug!("Health check requested");

    Json(serde_json::json!({
        "status": "healthy",
        "service": "veritoken-store",
        "backend": state.store.backend_name(),
    }))
}
