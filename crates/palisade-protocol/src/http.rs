//! Side HTTP surface: operation logs, tenant public keys, cross-instance
//! copy.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tower_http::cors::CorsLayer;

use palisade_store::{copy_tenant, EnvelopeStore, MemoryStore, StoreError};

use crate::service::VaultService;

const DEFAULT_LOG_LIMIT: u32 = 20;

/// Resolves a target-instance URI to a store handle. Keeps the copy
/// endpoint independent of any particular storage technology.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn EnvelopeStore>, StoreError>;
}

/// Connector handing out in-memory stores keyed by URI. For tests and
/// single-process setups.
#[derive(Default)]
pub struct MemoryConnector {
    instances: DashMap<String, Arc<MemoryStore>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instance(&self, uri: &str) -> Arc<MemoryStore> {
        self.instances
            .entry(uri.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new()))
            .clone()
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn EnvelopeStore>, StoreError> {
        Ok(self.instance(uri))
    }
}

/// Shared state of the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<VaultService>,
    pub connector: Option<Arc<dyn StoreConnector>>,
}

/// Build the side-surface router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/logs", get(get_logs))
        .route("/public-keys", get(get_public_keys))
        .route("/public-key", patch(patch_public_key))
        .route("/copy", post(post_copy))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn tenant_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-ename")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

fn bearer_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn missing_ename() -> (StatusCode, Json<JsonValue>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "X-ENAME header is required" })))
}

#[derive(Deserialize)]
struct LogsQuery {
    limit: Option<u32>,
    cursor: Option<String>,
}

async fn get_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> (StatusCode, Json<JsonValue>) {
    let Some(e_name) = tenant_header(&headers) else {
        return missing_ename();
    };
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    match state
        .service
        .operation_logs(&e_name, query.cursor.as_deref(), limit)
        .await
    {
        Ok(page) => match serde_json::to_value(&page) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => internal_error(e),
        },
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch operation logs");
            internal_error(e)
        }
    }
}

async fn get_public_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<JsonValue>) {
    let Some(e_name) = tenant_header(&headers) else {
        return missing_ename();
    };
    match state.service.store().get_public_keys(&e_name).await {
        Ok(keys) => (StatusCode::OK, Json(json!({ "publicKeys": keys }))),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
struct PublicKeyBody {
    #[serde(rename = "publicKey")]
    public_key: String,
}

async fn patch_public_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PublicKeyBody>,
) -> (StatusCode, Json<JsonValue>) {
    let Some(e_name) = tenant_header(&headers) else {
        return missing_ename();
    };
    let ctx = state
        .service
        .guard()
        .authenticate(bearer_header(&headers).as_deref(), Some(&e_name))
        .await;
    if !ctx.is_platform() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid or missing authentication token" })),
        );
    }
    if body.public_key.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "publicKey is required in request body" })),
        );
    }
    match state.service.store().add_public_key(&e_name, &body.public_key).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Public key added successfully" })),
        ),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
struct CopyBody {
    #[serde(rename = "targetUri")]
    target_uri: String,
}

async fn post_copy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CopyBody>,
) -> (StatusCode, Json<JsonValue>) {
    let Some(e_name) = tenant_header(&headers) else {
        return missing_ename();
    };
    let Some(connector) = &state.connector else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "no target connector configured" })),
        );
    };
    let target = match connector.connect(&body.target_uri).await {
        Ok(target) => target,
        Err(e) => return internal_error(e),
    };
    match copy_tenant(state.service.store().as_ref(), target.as_ref(), &e_name).await {
        Ok(copied) => (StatusCode::OK, Json(json!({ "success": true, "copied": copied }))),
        Err(e) => {
            tracing::error!(error = %e, "tenant copy failed");
            internal_error(e)
        }
    }
}

fn internal_error(error: impl std::fmt::Display) -> (StatusCode, Json<JsonValue>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": error.to_string() })),
    )
}
